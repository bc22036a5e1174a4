pub mod assets;
pub mod build_info;
pub mod crypto;
pub mod html;
pub mod htmx;
pub mod response;
