pub mod director;
pub mod error;
pub mod gateway;
pub mod headers;
pub mod path;
pub mod selector;
pub mod target;
pub mod transformer;

pub use director::{DirectorError, RequestDirector};
pub use error::{ProxyError, ProxyResult};
pub use gateway::ProxyService;
pub use selector::{RandomStrategy, RoundRobinStrategy, SelectionStrategy, SelectorFactory};
pub use target::{Target, TargetError, TargetTable};
pub use transformer::{ResponseTransformer, STATUS_ERROR_PREFIX, TransformError};
