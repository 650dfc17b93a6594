pub mod commission_service;
pub mod notification_service;
pub mod payment_service;
pub mod pricing_service;
pub mod qr_service;
pub mod reservation_service;
