//! An [InvokeFetcher] turns a host's generic command call into the three fetches the caches need.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use crate::*;

/// Renders a cursor file, given `{ "filePath": .. }`, into an encoded image string.
pub const LIBRARY_PREVIEW_COMMAND: &str = "get_library_cursor_preview";
/// Renders a system cursor, given `{ "cursorName": .. }`, into an encoded image string.
pub const SYSTEM_PREVIEW_COMMAND: &str = "get_system_cursor_preview";
/// Decodes an animated cursor file, given `{ "filePath": .. }`, into [AnimationData].
pub const ANIMATION_DATA_COMMAND: &str = "get_ani_preview_data";

#[derive(Debug)]
pub struct InvokeFetcher<I> {
    invoke: I,
}

impl<I: Invoke> InvokeFetcher<I> {
    pub fn new(invoke: I) -> InvokeFetcher<I> {
        InvokeFetcher { invoke }
    }

    async fn call<T: DeserializeOwned + Send>(
        &self,
        command: &str,
        args: Value,
    ) -> Result<T, FetchError> {
        let response = self.invoke.invoke(command, args).await?;
        serde_json::from_value(response).map_err(|e| FetchError::Malformed {
            command: command.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl<I: Invoke> PreviewFetcher for InvokeFetcher<I> {
    async fn library_preview(&self, path: &str) -> Result<String, FetchError> {
        self.call(LIBRARY_PREVIEW_COMMAND, json!({ "filePath": path }))
            .await
    }

    async fn system_preview(&self, name: &str) -> Result<String, FetchError> {
        self.call(SYSTEM_PREVIEW_COMMAND, json!({ "cursorName": name }))
            .await
    }

    async fn animation_data(&self, path: &str) -> Result<AnimationData, FetchError> {
        self.call(ANIMATION_DATA_COMMAND, json!({ "filePath": path }))
            .await
    }
}
