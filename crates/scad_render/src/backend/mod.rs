pub mod local;
pub mod wasm;

pub use local::LocalBackend;
pub use wasm::WasmBackend;
