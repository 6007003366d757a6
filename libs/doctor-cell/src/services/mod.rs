pub mod conflict;
pub mod lock;
pub mod schedule;
pub mod store;
pub mod supabase_store;

pub use conflict::{ensure_no_cross_clinic_conflict, find_conflict, has_conflict, windows_overlap};
pub use lock::{DoctorLease, DoctorLockManager, LocalDoctorLocks, RedisDoctorLocks};
pub use schedule::{ResolvedSlot, ScheduleService};
pub use store::{DoctorStore, InMemoryDoctorStore};
pub use supabase_store::SupabaseDoctorStore;
