//! # 文档库模块
//!
//! 负责患者文档的存储与管理：集合级的文档库契约、
//! 进程内实现，以及在其上组合删除级联与原子写回的患者资料库。

pub mod document;
pub mod memory;
pub mod repository;

pub use document::{Document, DocumentStore};
pub use memory::MemoryDocumentStore;
pub use repository::PatientRepository;
