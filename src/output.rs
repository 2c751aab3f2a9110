//! Audio outputs which pull blocks from an [`Engine`](crate::Engine).

#[cfg(all(target_arch = "wasm32", feature = "cpal-output"))]
compile_error!("wasm builds are not compatible with the cpal output");

#[cfg(feature = "cpal-output")]
pub mod cpal;
#[cfg(feature = "wav-output")]
pub mod wav;
