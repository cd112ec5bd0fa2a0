pub mod inventory_level;
pub mod inventory_reservation;
pub mod item;
pub mod location;
pub mod refund;
pub mod refund_line;
pub mod sale;
pub mod sale_line;
pub mod stock_movement;
pub mod transfer;
pub mod transfer_line;
