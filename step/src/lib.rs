//! Codec for the STEP market-data dialect of FIXT.1.1: tag-value field
//! primitives, message framing with BodyLength/CheckSum, per-type body
//! records, and the semantic validator.

pub mod decoder;
pub mod encoder;
pub mod field;
pub mod message;
pub mod support;
pub mod validator;

pub use crate::decoder::decode;
pub use crate::encoder::encode;
pub use crate::message::{MessageBody, MsgType, StepMessage};
pub use crate::support::{StepError, StepFault, StepResult};
pub use crate::validator::{validate, Direction};
