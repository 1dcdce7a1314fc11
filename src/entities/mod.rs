//! Entity module - SeaORM entity definitions for the two durable tables.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod payment;
pub mod user;

// Re-export specific types to avoid conflicts
pub use payment::{
    Column as PaymentColumn, Entity as Payment, Model as PaymentModel, PaymentProvider,
    PaymentStatus,
};
pub use user::{Column as UserColumn, Entity as User, Model as UserModel};
