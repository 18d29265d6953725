pub mod omise;
