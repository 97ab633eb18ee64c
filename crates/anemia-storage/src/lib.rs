//! # 照片对象存储模块
//!
//! 负责患者眼睑照片字节的存储：分块上传（带进度事件）、
//! 按公开URL删除。后端通过`object_store`抽象，服务进程使用
//! 本地文件系统，测试使用内存实现。

pub mod blob;
pub mod object;

pub use blob::{BlobStore, UploadProgress};
pub use object::ObjectBlobStore;
