pub mod issuance;
pub mod items;
pub mod logs;
pub mod notifications;
pub mod repairs;
pub mod requests;
pub mod serial_numbers;

pub use issuance::IssuanceService;
pub use items::ItemService;
pub use logs::ActivityLogService;
pub use notifications::NotificationService;
pub use repairs::RepairService;
pub use requests::RequestService;
pub use serial_numbers::SerialNumberAllocator;
