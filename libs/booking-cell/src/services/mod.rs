pub mod assignment;
pub mod booking;
pub mod conflict;
pub mod lifecycle;
pub mod locks;
pub mod payment;
pub mod refund;
pub mod slots;

pub use assignment::StaffAssignmentService;
pub use booking::BookingService;
pub use conflict::ConflictDetectionService;
pub use lifecycle::AppointmentLifecycleService;
pub use locks::SlotLockService;
pub use payment::PaymentClient;
pub use refund::CancellationService;
pub use slots::SlotService;
