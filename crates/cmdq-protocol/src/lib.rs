//! Wire types exchanged between clients and nodes: the request envelope, the
//! property schema used to validate client overrides, and response entities.

pub mod entity;
pub mod error;
pub mod properties;
pub mod request;

pub use entity::{
    CommandState, CommandStatusEntity, Entity, ErrorBody, ErrorCode, FunctionNameList,
    FunctionType, PrintTopicEntity, PropertyList, ResponseEnvelope, SimpleFunctionInfo, TopicList,
};
pub use error::ProtocolError;
pub use properties::{
    CoercedProperties, CoercedValue, PropertyError, PropertySchema, PropertyType, PropertyValue,
    coerce,
};
pub use request::RequestEnvelope;
