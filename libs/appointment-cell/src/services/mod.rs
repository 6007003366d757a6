pub mod booking;
pub mod capacity;
pub mod commission;
pub mod confirmation;
pub mod store;
pub mod supabase_store;

pub use booking::{receipt_for, BookingService};
pub use capacity::{is_available, SlotCapacityCounter};
pub use commission::{CommissionConfig, CommissionSource, FixedCommission, SupabaseCommissionSource};
pub use confirmation::ConfirmationService;
pub use store::{AppointmentStore, InMemoryAppointmentStore};
pub use supabase_store::SupabaseAppointmentStore;
