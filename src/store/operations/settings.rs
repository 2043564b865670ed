use crate::store::{Store, StoreError};

/// 进程级用户偏好，对核心完全不透明，原样存取 JSON。
const SETTINGS_KEY: &str = "app";

impl Store {
    pub fn get_settings(&self) -> Result<serde_json::Value, StoreError> {
        match self.settings.get(SETTINGS_KEY.as_bytes())? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(serde_json::json!({})),
        }
    }

    pub fn put_settings(
        &self,
        value: &serde_json::Value,
    ) -> Result<serde_json::Value, StoreError> {
        self.settings
            .insert(SETTINGS_KEY.as_bytes(), serde_json::to_vec(value)?)?;
        Ok(value.clone())
    }
}
