pub mod booking;
pub mod conflict;
pub mod directory;
pub mod lifecycle;

pub use booking::BookingService;
pub use conflict::ConflictService;
pub use directory::DirectoryService;
pub use lifecycle::LifecycleService;
