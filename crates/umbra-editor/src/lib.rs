pub mod change;
pub mod config;
pub mod copypaste;
pub mod diagram;
pub mod error;
pub mod item;
pub mod persist;
pub mod session;
pub mod transaction;
pub mod undo;
pub mod watcher;

pub use change::{Change, ItemSnapshot};
pub use config::{ItemDefaults, SessionConfig};
pub use copypaste::CopyBuffer;
pub use diagram::Diagram;
pub use error::EditorError;
pub use item::{HasHandles, HasName, HasSubject, Item, ItemKind, Shape};
pub use persist::{ElementRecord, ItemRecord, ModelSnapshot, PersistValue};
pub use session::{DIAGRAM_TYPE, Event, ObserverId, Session};
pub use transaction::TransactionLog;
pub use undo::UndoManager;
pub use watcher::{Handler, Step, WatchPath, WatchRegistry};
