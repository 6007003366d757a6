// libs/appointment-cell/src/services/commission.rs
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;

use crate::models::AppointmentError;

/// Platform fee (major currency units) and booking commission percentage.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CommissionConfig {
    pub platform_fee: f64,
    pub booking_commission_percent: f64,
}

impl Default for CommissionConfig {
    fn default() -> Self {
        Self {
            platform_fee: 1.0,
            booking_commission_percent: 0.0,
        }
    }
}

impl CommissionConfig {
    /// Fee in minor units (x100). A missing or non-positive fee counts as 1.
    pub fn platform_fee_minor_units(&self) -> u64 {
        let fee = if self.platform_fee.is_finite() && self.platform_fee > 0.0 {
            self.platform_fee
        } else {
            1.0
        };

        (fee * 100.0).round() as u64
    }

    /// Commission on `total_amount`, rounded to 2 decimals.
    pub fn booking_commission(&self, total_amount: f64) -> f64 {
        if !self.booking_commission_percent.is_finite() || self.booking_commission_percent <= 0.0 {
            return 0.0;
        }

        (self.booking_commission_percent * total_amount / 100.0 * 100.0).round() / 100.0
    }
}

/// Read-only source of the current commission settings.
#[async_trait]
pub trait CommissionSource: Send + Sync {
    async fn current(&self) -> Result<CommissionConfig, AppointmentError>;
}

/// Fixed settings, for tests and deployments without a commission table.
pub struct FixedCommission(pub CommissionConfig);

#[async_trait]
impl CommissionSource for FixedCommission {
    async fn current(&self) -> Result<CommissionConfig, AppointmentError> {
        Ok(self.0)
    }
}

#[derive(Debug, Deserialize)]
struct CommissionRow {
    platform_fee: Option<f64>,
    booking_commission: Option<f64>,
}

/// Reads the single `admin_commissions` row; defaults apply when it is absent.
pub struct SupabaseCommissionSource {
    supabase: Arc<SupabaseClient>,
    service_key: String,
}

impl SupabaseCommissionSource {
    pub fn new(config: &AppConfig, supabase: Arc<SupabaseClient>) -> Self {
        Self {
            supabase,
            service_key: config.storage_key().to_string(),
        }
    }
}

#[async_trait]
impl CommissionSource for SupabaseCommissionSource {
    async fn current(&self) -> Result<CommissionConfig, AppointmentError> {
        let path = "/rest/v1/admin_commissions?select=platform_fee,booking_commission&order=updated_at.desc&limit=1";

        let rows: Vec<CommissionRow> = self
            .supabase
            .request(Method::GET, path, Some(&self.service_key), None)
            .await
            .map_err(|e| {
                error!("Failed to load commission settings: {}", e);
                AppointmentError::Dependency(e.to_string())
            })?;

        let defaults = CommissionConfig::default();
        let Some(row) = rows.into_iter().next() else {
            info!("No commission settings stored, using defaults");
            return Ok(defaults);
        };

        let config = CommissionConfig {
            platform_fee: row.platform_fee.unwrap_or(defaults.platform_fee),
            booking_commission_percent: row
                .booking_commission
                .unwrap_or(defaults.booking_commission_percent),
        };
        debug!("Commission settings: {:?}", config);
        Ok(config)
    }
}
