mod error;
pub use error::{Error, Result};

pub mod stream;

mod manifest;
pub use manifest::Manifest;

mod info;
pub use info::{ArtifactDepends, ArtifactProvides, HeaderInfo, Info, UpdateTypeEntry};

mod subheader;

pub mod handler;
pub use handler::{FileInfo, Handler, Registry, UpdateHeader};

mod reader;
pub use reader::{Reader, ReaderConfig, SignatureStatus, Summary, UpdateSummary};

mod writer;
pub use writer::{Writer, WriterConfig, WriterFile, WriterUpdate};

mod sign_in_place;
pub use sign_in_place::sign_in_place;
