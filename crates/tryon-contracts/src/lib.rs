pub mod catalog;
pub mod error;
pub mod events;
pub mod payload;
pub mod request;

pub use catalog::{Catalog, Product, ProductCatalog};
pub use error::{ErrorKind, InputRule, TryOnError};
pub use events::{AttemptOutcome, EventWriter, TryOnEvent};
pub use payload::ImagePayload;
pub use request::{GenerationRequest, ImageRole, Part, RequestShapeError};
