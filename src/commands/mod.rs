pub mod inspect;
pub mod stream;
