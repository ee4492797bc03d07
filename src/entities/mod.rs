pub mod activity_log;
pub mod damaged_item;
pub mod issued_item;
pub mod item;
pub mod notification;
pub mod repair_request;
pub mod request;
pub mod user;
