use image_pipeline::{
    compress_for_storage, is_image_mime, normalize_upload, NormalizeConfig, StorageConfig,
    Strategy,
};
use web_sys::File;

async fn read_file_bytes(file: File) -> Result<Vec<u8>, String> {
    let buffer = wasm_bindgen_futures::JsFuture::from(file.array_buffer())
        .await
        .map_err(|_| "failed to read file".to_string())?;
    let array = js_sys::Uint8Array::new(&buffer);
    Ok(array.to_vec())
}

#[derive(Debug)]
pub(crate) enum UploadError {
    NotAnImage,
    Read(String),
}

/// Reads the picked file and turns it into the data URL the editing node shows.
pub(crate) async fn prepare_upload(file: File) -> Result<String, UploadError> {
    let mime = file.type_();
    if !is_image_mime(&mime) {
        return Err(UploadError::NotAnImage);
    }
    let bytes = read_file_bytes(file).await.map_err(UploadError::Read)?;
    let normalized = normalize_upload(&bytes, &mime, &NormalizeConfig::default());
    if normalized.strategy == Strategy::Fallback {
        gloo::console::warn!("upload: re-encode failed, embedding original", bytes.len());
    }
    Ok(normalized.data_url)
}

pub(crate) fn compress_for_save(data_url: &str) -> String {
    let payload = compress_for_storage(data_url, &StorageConfig::default());
    if payload.strategy == Strategy::Fallback {
        gloo::console::warn!("save: storage compression failed, sending as-is");
    }
    payload.data_url
}
