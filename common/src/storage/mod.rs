pub mod db;
pub mod repository;
pub mod workspace_repository;

pub use db::PgDb;
pub use repository::{DocumentOutcome, DocumentRepository, PgDocumentRepository};
pub use workspace_repository::{PgWorkspaceRepository, WorkspaceRepository};
