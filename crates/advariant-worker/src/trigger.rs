//! Storage-event trigger parsing.
//!
//! A worker is invoked with the storage key of the file whose creation
//! fired the event. The key layout is
//! `<root video folder>[/<batch folder>]/<file name>`; which job runs is
//! decided entirely by the file name.

use advariant_models::naming;

use crate::error::{WorkerError, WorkerResult};

/// A parsed trigger key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerFile {
    /// The full storage key.
    pub full_path: String,
    /// First path component: the root video folder.
    pub root_folder: String,
    /// Parent folder of the trigger file (the batch folder for render
    /// triggers).
    pub folder: String,
    /// The trigger file name.
    pub file_name: String,
}

/// The job a trigger resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    /// Build shared cropped sources and fan out per-variant triggers.
    InitialRender,
    /// Render one variant.
    VariantRender { variant_id: u32, total: u32 },
    /// Merge all partial results into the combined file.
    FinaliseRender { total: u32 },
    /// Append an end slate to a finished batch.
    EndSlate,
    /// Not a trigger this worker handles.
    Unknown,
}

impl TriggerFile {
    /// Parse a storage key into its folder components.
    pub fn parse(path: &str) -> WorkerResult<Self> {
        let path = path.trim_matches('/');
        let (folder, file_name) = path
            .rsplit_once('/')
            .ok_or_else(|| WorkerError::invalid_trigger(format!("no folder in key: {path}")))?;
        if file_name.is_empty() {
            return Err(WorkerError::invalid_trigger(format!("empty file name: {path}")));
        }
        let root_folder = path
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();

        Ok(Self {
            full_path: path.to_string(),
            root_folder,
            folder: folder.to_string(),
            file_name: file_name.to_string(),
        })
    }

    /// Decide which job this trigger fires.
    pub fn kind(&self) -> TriggerKind {
        if self.file_name == naming::RENDER_FILE {
            return TriggerKind::InitialRender;
        }
        if self.file_name == naming::END_SLATE_FILE {
            return TriggerKind::EndSlate;
        }
        if let Some((variant_id, total)) = naming::parse_variant_token(&self.file_name) {
            if self.file_name.ends_with(naming::FINALISE_RENDER_FILE) {
                return TriggerKind::FinaliseRender { total };
            }
            if self.file_name.ends_with(naming::RENDER_FILE) {
                return TriggerKind::VariantRender { variant_id, total };
            }
        }
        TriggerKind::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_components() {
        let trigger = TriggerFile::parse("demo/1234-combos/2-5_render.json").unwrap();
        assert_eq!(trigger.root_folder, "demo");
        assert_eq!(trigger.folder, "demo/1234-combos");
        assert_eq!(trigger.file_name, "2-5_render.json");
    }

    #[test]
    fn test_kind_dispatch() {
        let kind = |path: &str| TriggerFile::parse(path).unwrap().kind();

        assert_eq!(kind("demo/1234-combos/render.json"), TriggerKind::InitialRender);
        assert_eq!(
            kind("demo/1234-combos/2-5_render.json"),
            TriggerKind::VariantRender { variant_id: 2, total: 5 }
        );
        assert_eq!(
            kind("demo/1234-combos/5-5_finalise_render.json"),
            TriggerKind::FinaliseRender { total: 5 }
        );
        assert_eq!(kind("demo/end_slate.json"), TriggerKind::EndSlate);
        assert_eq!(kind("demo/1234-combos/combos.json"), TriggerKind::Unknown);
        assert_eq!(kind("demo/1234-combos/2-5_combos.json"), TriggerKind::Unknown);
    }

    #[test]
    fn test_rootless_key_is_rejected() {
        assert!(TriggerFile::parse("render.json").is_err());
        assert!(TriggerFile::parse("demo/").is_err());
    }
}
