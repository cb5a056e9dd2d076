pub mod acl;
pub mod actor;
pub mod chunk;
pub mod conversation;
pub mod document;
pub mod node;
pub mod workspace;

pub use acl::{AclEntry, AclRole};
pub use actor::{Actor, ActorRole};
pub use chunk::{Chunk, ScoredChunk};
pub use conversation::{Conversation, ConversationRole, Message};
pub use document::{Document, DocumentFilters, DocumentSortKey, DocumentStatus};
pub use node::{Node, NodeSpan};
pub use workspace::{FtsLanguage, Workspace, WorkspaceVisibility};

/// Global embedding dimension. Every chunk and node embedding must match this.
pub const EMBEDDING_DIM: usize = 768;
