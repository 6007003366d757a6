// libs/appointment-cell/tests/common/mod.rs
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use uuid::Uuid;

use appointment_cell::models::*;
use appointment_cell::services::{
    BookingService, CommissionConfig, ConfirmationService, FixedCommission, InMemoryAppointmentStore,
};
use doctor_cell::models::{Clinic, ClinicFee, DaySlot, Doctor, DoctorScheduleEntry, Weekday};
use doctor_cell::services::{InMemoryDoctorStore, LocalDoctorLocks, ScheduleService};
use payment_cell::models::{CreateOrderRequest, GatewayOrder, GatewayRefund, PaymentError, RefundRequest};
use payment_cell::services::PaymentGateway;
use shared_utils::test_utils::{TestConfig, WebhookTestUtils};

/// In-process gateway double that records every call.
#[derive(Default)]
pub struct FakeGateway {
    pub orders: Mutex<Vec<(String, CreateOrderRequest)>>,
    pub refunds: Mutex<Vec<(String, RefundRequest)>>,
    pub delay: Option<Duration>,
    pub fail_refunds: bool,
    counter: AtomicUsize,
}

impl FakeGateway {
    pub fn slow(delay: Duration) -> Self {
        Self { delay: Some(delay), ..Self::default() }
    }

    pub fn failing_refunds() -> Self {
        Self { fail_refunds: true, ..Self::default() }
    }

    pub fn order_count(&self) -> usize {
        self.orders.lock().unwrap().len()
    }

    pub fn notes_for(&self, order_id: &str) -> Value {
        self.orders
            .lock()
            .unwrap()
            .iter()
            .find(|(id, _)| id == order_id)
            .map(|(_, request)| Value::Object(request.notes.clone()))
            .unwrap_or_else(|| json!([]))
    }

    pub fn refunded_payments(&self) -> Vec<String> {
        self.refunds.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn create_order(&self, request: &CreateOrderRequest) -> Result<GatewayOrder, PaymentError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let id = format!("order_{}", self.counter.fetch_add(1, Ordering::SeqCst) + 1);
        self.orders.lock().unwrap().push((id.clone(), request.clone()));

        Ok(GatewayOrder {
            id,
            amount: request.amount,
            currency: request.currency.clone(),
            receipt: Some(request.receipt.clone()),
            status: "created".to_string(),
            notes: Value::Object(request.notes.clone()),
        })
    }

    async fn refund_payment(
        &self,
        payment_id: &str,
        request: &RefundRequest,
    ) -> Result<GatewayRefund, PaymentError> {
        if self.fail_refunds {
            return Err(PaymentError::Gateway {
                status: Some(400),
                message: "The payment has been fully refunded already".to_string(),
            });
        }

        self.refunds
            .lock()
            .unwrap()
            .push((payment_id.to_string(), request.clone()));

        Ok(GatewayRefund {
            id: format!("rfnd_{}", payment_id),
            payment_id: payment_id.to_string(),
            amount: 100,
            status: "processed".to_string(),
        })
    }

    fn key_id(&self) -> &str {
        "rzp_test_key"
    }
}

pub struct Fixture {
    pub config: TestConfig,
    pub doctors: Arc<InMemoryDoctorStore>,
    pub schedules: Arc<ScheduleService>,
    pub appointments: Arc<InMemoryAppointmentStore>,
    pub gateway: Arc<FakeGateway>,
    pub booking: Arc<BookingService>,
    pub confirmation: Arc<ConfirmationService>,
    pub doctor_id: Uuid,
    pub clinic_id: Uuid,
    /// Monday 09:00-12:00, two patients.
    pub slot: DaySlot,
}

pub fn clinic(id: Uuid) -> Clinic {
    Clinic {
        id,
        name: "Sunrise Clinic".to_string(),
        email: None,
        phone_number: Some("+912222222222".to_string()),
        address_one: Some("12 MG Road".to_string()),
        address_two: None,
        city: "Bengaluru".to_string(),
        state: Some("Karnataka".to_string()),
        pincode: Some("560001".to_string()),
    }
}

pub async fn fixture() -> Fixture {
    fixture_with(FakeGateway::default(), CommissionConfig::default()).await
}

pub async fn fixture_with(gateway: FakeGateway, commission: CommissionConfig) -> Fixture {
    let config = TestConfig::default();
    let doctors = Arc::new(InMemoryDoctorStore::new());
    let clinic_id = Uuid::new_v4();
    doctors.insert_clinic(clinic(clinic_id)).await;

    let slot = DaySlot {
        id: Uuid::new_v4(),
        day: Weekday::Monday,
        start_time: "09:00".parse().unwrap(),
        end_time: "12:00".parse().unwrap(),
        max_slots: 2,
    };

    let doctor_id = Uuid::new_v4();
    doctors
        .insert_doctor(Doctor {
            id: doctor_id,
            full_name: "Dr. Anil Rao".to_string(),
            email: None,
            specialization: "Cardiology".to_string(),
            registration_number: "REG-7".to_string(),
            phone_number: None,
            clinics: vec![clinic_id],
            fees: vec![ClinicFee { clinic_id, fee: 500.0 }],
            appointments_schedule: vec![DoctorScheduleEntry {
                clinic_id,
                schedule: vec![slot.clone()],
            }],
            version: 1,
        })
        .await;

    let schedules = Arc::new(ScheduleService::new(doctors.clone(), Arc::new(LocalDoctorLocks::default())));
    let appointments = Arc::new(InMemoryAppointmentStore::new());
    let gateway = Arc::new(gateway);
    let commission = Arc::new(FixedCommission(commission));

    let booking = Arc::new(
        BookingService::new(schedules.clone(), appointments.clone(), gateway.clone(), commission.clone())
            .with_call_timeout(Duration::from_millis(200)),
    );
    let confirmation = Arc::new(
        ConfirmationService::new(
            schedules.clone(),
            appointments.clone(),
            gateway.clone(),
            commission,
            &config.webhook_secret,
        )
        .with_call_timeout(Duration::from_millis(200)),
    );

    Fixture {
        config,
        doctors,
        schedules,
        appointments,
        gateway,
        booking,
        confirmation,
        doctor_id,
        clinic_id,
        slot,
    }
}

impl Fixture {
    pub fn intent(&self) -> BookingIntentRequest {
        BookingIntentRequest {
            doctor_id: Some(self.doctor_id.to_string()),
            clinic_id: Some(self.clinic_id.to_string()),
            schedule_entry_id: Some(self.slot.id.to_string()),
            full_name: Some("Priya Nair".to_string()),
            phone_number: Some("+919812345678".to_string()),
            age: Some(json!(29)),
            gender: Some("female".to_string()),
            health_insured: Some(json!(true)),
            billing_address: None,
            terms_accepted: Some(json!(true)),
            appointment_date: Some("10-06-2024".to_string()),
        }
    }

    /// An already-confirmed appointment in the fixture slot on 10-06-2024.
    pub fn booked(&self, n: usize) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            created_by: format!("user-{}", n),
            doctor_id: self.doctor_id,
            clinic_id: self.clinic_id,
            snapshot: AppointmentSnapshot {
                doctor_name: "Dr. Anil Rao".to_string(),
                specialization: "Cardiology".to_string(),
                doctor_fee: Some(500.0),
                clinic_name: "Sunrise Clinic".to_string(),
                clinic_address: "12 MG Road, Bengaluru".to_string(),
                clinic_number: None,
            },
            full_name: format!("Patient {}", n),
            phone_number: "+910000000000".to_string(),
            age: 40,
            gender: Gender::Other,
            appointment_day: Weekday::Monday,
            appointment_date: "10-06-2024".to_string(),
            appointment_time_from: self.slot.start_time,
            appointment_time_to: self.slot.end_time,
            health_insured: false,
            terms_accepted: true,
            billing_address: None,
            payment_status: PaymentStatus::Paid,
            payment_method: "card".to_string(),
            payment_id: format!("pay_seed_{}", n),
            order_id: format!("order_seed_{}", n),
            amount_paid: 1.0,
            total_amount: 1.0,
            booking_commission: 0.0,
            created_at: Utc::now(),
        }
    }

    /// Signed `payment.captured` delivery for an order issued by this fixture.
    pub fn captured(&self, payment_id: &str, order: &OrderIssued) -> (Vec<u8>, String) {
        let notes = self.gateway.notes_for(&order.order_id);
        let event = WebhookTestUtils::payment_captured(payment_id, &order.order_id, order.amount_minor_units, notes);
        self.signed(&event)
    }

    pub fn signed(&self, event: &Value) -> (Vec<u8>, String) {
        let body = serde_json::to_vec(event).unwrap();
        let signature = WebhookTestUtils::sign(&body, &self.config.webhook_secret);
        (body, signature)
    }
}
