pub mod health;
pub mod make;
