//! Domain entities shared by the repositories, services and API layer.

pub mod enrollment;
pub mod order;
pub mod payment;

pub use enrollment::Enrollment;
pub use order::{Order, OrderItem, OrderStatus};
pub use payment::{NewPayment, Payment, PaymentFilter, PaymentStatus, PaymentType};
