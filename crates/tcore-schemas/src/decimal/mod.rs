mod decimal8;
mod micros;

pub use decimal8::Decimal8;
pub use micros::Micros;
