pub mod resp;
mod serializer;

pub use resp::{RespFrame, RespReader};
pub use serializer::ReqSerializer;
