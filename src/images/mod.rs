pub mod multipart;
pub mod services;

pub use multipart::{MultipartForm, UploadedFile};
pub use services::{delete_image, settle_upload, upload_image, StoredImage};
