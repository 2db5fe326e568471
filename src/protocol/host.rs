//! Host side of the message boundary: answers UI requests against a
//! [`HostEnvironment`] and moves JSON messages over an in-process channel.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};

use serde_json::Value;

use super::{decode_data_url, DataUrl, PluginMessage, ProtocolError};

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("not supported by this host: {0}")]
    Unsupported(String),
    #[error("nothing is selected")]
    NoSelection,
    #[error("selection cannot be exported: {0}")]
    InvalidSelection(String),
    #[error("storage failure: {0}")]
    Storage(String),
    #[error("channel closed")]
    Disconnected,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

pub type Result<T> = std::result::Result<T, HostError>;

/// What the host exports for the current selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportedSelection {
    pub svg: String,
    pub geometry_scale: Option<f32>,
}

/// Key/value persistence for UI snapshots.
pub trait KeyValueStorage {
    fn get(&self, key: &str) -> Result<Option<Value>>;
    fn set(&mut self, key: &str, value: Value) -> Result<()>;
}

/// Capabilities of the tool hosting the viewer.
pub trait HostEnvironment {
    fn export_selection(&mut self) -> Result<ExportedSelection>;

    fn storage(&mut self) -> &mut dyn KeyValueStorage;

    fn add_image(&mut self, image: &DataUrl) -> Result<()>;

    /// Hosts without video support return [`HostError::Unsupported`].
    fn add_video(&mut self, video: &DataUrl) -> Result<()>;
}

impl<S: KeyValueStorage + ?Sized> KeyValueStorage for Box<S> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key)
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        (**self).set(key, value)
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemoryStorage {
    values: BTreeMap<String, Value>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStorage for MemoryStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// One JSON object on disk, keyed by storage key. Rewritten on every set.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> Result<BTreeMap<String, Value>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&text)
            .map_err(|err| HostError::Storage(format!("{}: {}", self.path.display(), err)))
    }
}

impl KeyValueStorage for FileStorage {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.read_all()?.remove(key))
    }

    fn set(&mut self, key: &str, value: Value) -> Result<()> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value);
        let text = serde_json::to_string_pretty(&values)
            .map_err(|err| HostError::Storage(err.to_string()))?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(&self.path, text)?;
        Ok(())
    }
}

/// Host without a document: the selection is a fixed SVG, images go to a
/// file (or stay in memory), and video is unsupported.
pub struct HeadlessHost<S: KeyValueStorage> {
    selection: Option<ExportedSelection>,
    storage: S,
    image_path: Option<PathBuf>,
    images: Vec<DataUrl>,
}

impl<S: KeyValueStorage> HeadlessHost<S> {
    pub fn new(selection: Option<ExportedSelection>, storage: S) -> Self {
        Self {
            selection,
            storage,
            image_path: None,
            images: Vec::new(),
        }
    }

    /// Writes added images to `path` instead of keeping them.
    pub fn with_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn images(&self) -> &[DataUrl] {
        &self.images
    }
}

impl<S: KeyValueStorage> HostEnvironment for HeadlessHost<S> {
    fn export_selection(&mut self) -> Result<ExportedSelection> {
        let selection = self.selection.clone().ok_or(HostError::NoSelection)?;
        if selection.svg.trim().is_empty() {
            return Err(HostError::InvalidSelection("empty SVG export".to_string()));
        }
        Ok(selection)
    }

    fn storage(&mut self) -> &mut dyn KeyValueStorage {
        &mut self.storage
    }

    fn add_image(&mut self, image: &DataUrl) -> Result<()> {
        match &self.image_path {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        std::fs::create_dir_all(parent)?;
                    }
                }
                std::fs::write(path, &image.bytes)?;
                log::info!("image written to {}", path.display());
            }
            None => self.images.push(image.clone()),
        }
        Ok(())
    }

    fn add_video(&mut self, _video: &DataUrl) -> Result<()> {
        Err(HostError::Unsupported("video embedding".to_string()))
    }
}

/// Answers UI requests. Responses include `notify` messages for anything the
/// user should see.
pub struct HostService<E: HostEnvironment> {
    env: E,
}

impl<E: HostEnvironment> HostService<E> {
    pub fn new(env: E) -> Self {
        Self { env }
    }

    pub fn env(&self) -> &E {
        &self.env
    }

    pub fn env_mut(&mut self) -> &mut E {
        &mut self.env
    }

    pub fn handle(&mut self, request: PluginMessage) -> Vec<PluginMessage> {
        match request {
            PluginMessage::GetSelectionSvg => self.selection(),
            PluginMessage::SaveStorage { key, value } => {
                if let Err(err) = self.env.storage().set(&key, value) {
                    log::warn!("failed to save '{}': {}", key, err);
                }
                Vec::new()
            }
            PluginMessage::LoadStorage { key } => {
                let value = match self.env.storage().get(&key) {
                    Ok(value) => value.unwrap_or(Value::Null),
                    Err(err) => {
                        log::warn!("failed to load '{}': {}", key, err);
                        Value::Null
                    }
                };
                vec![PluginMessage::StorageLoaded { key, value }]
            }
            PluginMessage::AddImage { image } => match self.add_image(&image) {
                Ok(()) => vec![notify("Image added")],
                Err(err) => {
                    log::warn!("failed to add image: {}", err);
                    vec![notify(format!("Could not add image: {err}"))]
                }
            },
            PluginMessage::AddVideo { video, image } => self.add_video_or_image(&video, &image),
            other => {
                log::warn!("ignoring non-request message {:?}", other);
                Vec::new()
            }
        }
    }

    fn selection(&mut self) -> Vec<PluginMessage> {
        match self.env.export_selection() {
            Ok(selection) => {
                log::debug!("exported selection ({} bytes of SVG)", selection.svg.len());
                vec![PluginMessage::SelectionSvg {
                    svg: selection.svg,
                    geometry_scale: selection.geometry_scale,
                }]
            }
            Err(HostError::NoSelection) => vec![
                PluginMessage::NoSelection,
                notify("Select a layer to extrude"),
            ],
            Err(err) => {
                log::warn!("selection export failed: {}", err);
                vec![
                    PluginMessage::InvalidSelection,
                    notify("Error converting selection"),
                ]
            }
        }
    }

    fn add_image(&mut self, image: &str) -> Result<()> {
        let image = decode_data_url(image)?;
        self.env.add_image(&image)
    }

    fn add_video_or_image(&mut self, video: &str, image: &str) -> Vec<PluginMessage> {
        let attempt = decode_data_url(video)
            .map_err(HostError::from)
            .and_then(|video| self.env.add_video(&video));
        match attempt {
            Ok(()) => vec![notify("Video added")],
            Err(err) => {
                log::info!("video not added ({}); falling back to image", err);
                match self.add_image(image) {
                    Ok(()) => vec![notify(
                        "Image added (a pro plan is required for video)",
                    )],
                    Err(err) => {
                        log::warn!("fallback image failed: {}", err);
                        vec![notify(format!("Could not add image: {err}"))]
                    }
                }
            }
        }
    }
}

fn notify(message: impl Into<String>) -> PluginMessage {
    PluginMessage::Notify {
        message: message.into(),
    }
}

/// UI end of the in-process channel. Messages travel as JSON text.
pub struct UiEndpoint {
    requests: Sender<String>,
    responses: Receiver<String>,
}

impl UiEndpoint {
    pub fn send(&self, message: &PluginMessage) -> Result<()> {
        let text = message.to_json()?;
        self.requests.send(text).map_err(|_| HostError::Disconnected)
    }

    /// Next decoded response, if one is waiting. Malformed messages are
    /// logged and skipped.
    pub fn try_recv(&self) -> Result<Option<PluginMessage>> {
        loop {
            match self.responses.try_recv() {
                Ok(text) => match PluginMessage::from_json(&text) {
                    Ok(message) => return Ok(Some(message)),
                    Err(err) => log::warn!("dropping malformed response: {}", err),
                },
                Err(TryRecvError::Empty) => return Ok(None),
                Err(TryRecvError::Disconnected) => return Err(HostError::Disconnected),
            }
        }
    }

    pub fn drain(&self) -> Result<Vec<PluginMessage>> {
        let mut messages = Vec::new();
        while let Some(message) = self.try_recv()? {
            messages.push(message);
        }
        Ok(messages)
    }
}

/// Host end of the channel, owning the service.
pub struct HostBridge<E: HostEnvironment> {
    service: HostService<E>,
    requests: Receiver<String>,
    responses: Sender<String>,
}

impl<E: HostEnvironment> HostBridge<E> {
    pub fn service(&self) -> &HostService<E> {
        &self.service
    }

    /// Handles every pending request and returns how many were processed.
    pub fn pump(&mut self) -> Result<usize> {
        let mut handled = 0;
        loop {
            let text = match self.requests.try_recv() {
                Ok(text) => text,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) if handled > 0 => break,
                Err(TryRecvError::Disconnected) => return Err(HostError::Disconnected),
            };
            handled += 1;
            let request = match PluginMessage::from_json(&text) {
                Ok(request) => request,
                Err(err) => {
                    log::warn!("dropping malformed request: {}", err);
                    continue;
                }
            };
            for response in self.service.handle(request) {
                let text = response.to_json()?;
                self.responses
                    .send(text)
                    .map_err(|_| HostError::Disconnected)?;
            }
        }
        Ok(handled)
    }
}

pub fn channel<E: HostEnvironment>(service: HostService<E>) -> (UiEndpoint, HostBridge<E>) {
    let (request_tx, request_rx) = mpsc::channel();
    let (response_tx, response_rx) = mpsc::channel();
    (
        UiEndpoint {
            requests: request_tx,
            responses: response_rx,
        },
        HostBridge {
            service,
            requests: request_rx,
            responses: response_tx,
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_data_url;
    use serde_json::json;

    struct VideoHost {
        inner: HeadlessHost<MemoryStorage>,
        videos: usize,
    }

    impl HostEnvironment for VideoHost {
        fn export_selection(&mut self) -> Result<ExportedSelection> {
            self.inner.export_selection()
        }
        fn storage(&mut self) -> &mut dyn KeyValueStorage {
            self.inner.storage()
        }
        fn add_image(&mut self, image: &DataUrl) -> Result<()> {
            self.inner.add_image(image)
        }
        fn add_video(&mut self, _video: &DataUrl) -> Result<()> {
            self.videos += 1;
            Ok(())
        }
    }

    fn selected(svg: &str) -> HostService<HeadlessHost<MemoryStorage>> {
        HostService::new(HeadlessHost::new(
            Some(ExportedSelection {
                svg: svg.to_string(),
                geometry_scale: Some(1.5),
            }),
            MemoryStorage::new(),
        ))
    }

    fn png_url() -> String {
        encode_data_url("image/png", &[137, 80, 78, 71])
    }

    #[test]
    fn selection_round_trip() {
        let mut service = selected("<svg/>");
        let responses = service.handle(PluginMessage::GetSelectionSvg);
        assert_eq!(
            responses,
            vec![PluginMessage::SelectionSvg {
                svg: "<svg/>".into(),
                geometry_scale: Some(1.5)
            }]
        );
    }

    #[test]
    fn missing_and_invalid_selection() {
        let mut service = HostService::new(HeadlessHost::new(None, MemoryStorage::new()));
        let responses = service.handle(PluginMessage::GetSelectionSvg);
        assert_eq!(responses[0], PluginMessage::NoSelection);
        assert!(matches!(responses[1], PluginMessage::Notify { .. }));

        let mut service = selected("   ");
        let responses = service.handle(PluginMessage::GetSelectionSvg);
        assert_eq!(responses[0], PluginMessage::InvalidSelection);
    }

    #[test]
    fn storage_save_then_load() {
        let mut service = selected("<svg/>");
        let saved = service.handle(PluginMessage::SaveStorage {
            key: "cache".into(),
            value: json!({"playing": false}),
        });
        assert!(saved.is_empty());

        let loaded = service.handle(PluginMessage::LoadStorage { key: "cache".into() });
        assert_eq!(
            loaded,
            vec![PluginMessage::StorageLoaded {
                key: "cache".into(),
                value: json!({"playing": false})
            }]
        );

        let missing = service.handle(PluginMessage::LoadStorage { key: "other".into() });
        assert_eq!(
            missing,
            vec![PluginMessage::StorageLoaded {
                key: "other".into(),
                value: Value::Null
            }]
        );
    }

    #[test]
    fn file_storage_persists_between_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store").join("plugin.json");

        let mut storage = FileStorage::new(&path);
        assert_eq!(storage.get("cache").unwrap(), None);
        storage.set("cache", json!({"svg": "<svg/>"})).unwrap();
        storage.set("other", json!(3)).unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get("cache").unwrap(), Some(json!({"svg": "<svg/>"})));
        assert_eq!(reopened.get("other").unwrap(), Some(json!(3)));
    }

    #[test]
    fn corrupt_file_storage_reports_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plugin.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            FileStorage::new(&path).get("cache"),
            Err(HostError::Storage(_))
        ));
    }

    #[test]
    fn video_falls_back_to_image_with_disclaimer() {
        let mut service = selected("<svg/>");
        let responses = service.handle(PluginMessage::AddVideo {
            video: encode_data_url("video/mp4", &[0, 0, 0, 24]),
            image: png_url(),
        });
        assert_eq!(
            responses,
            vec![PluginMessage::Notify {
                message: "Image added (a pro plan is required for video)".into()
            }]
        );
        assert_eq!(service.env().images().len(), 1);
        assert_eq!(service.env().images()[0].mime, "image/png");
    }

    #[test]
    fn video_is_embedded_when_supported() {
        let mut service = HostService::new(VideoHost {
            inner: HeadlessHost::new(None, MemoryStorage::new()),
            videos: 0,
        });
        let responses = service.handle(PluginMessage::AddVideo {
            video: encode_data_url("video/mp4", &[1]),
            image: png_url(),
        });
        assert_eq!(
            responses,
            vec![PluginMessage::Notify {
                message: "Video added".into()
            }]
        );
        assert_eq!(service.env().videos, 1);
        assert!(service.env().inner.images().is_empty());
    }

    #[test]
    fn bad_image_payload_is_notified() {
        let mut service = selected("<svg/>");
        let responses = service.handle(PluginMessage::AddImage {
            image: "not a data url".into(),
        });
        assert!(matches!(
            &responses[0],
            PluginMessage::Notify { message } if message.starts_with("Could not add image")
        ));
    }

    #[test]
    fn image_written_to_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let host = HeadlessHost::new(None, MemoryStorage::new()).with_image_path(&path);
        let mut service = HostService::new(host);
        service.handle(PluginMessage::AddImage { image: png_url() });
        assert_eq!(std::fs::read(&path).unwrap(), vec![137, 80, 78, 71]);
    }

    #[test]
    fn bridge_moves_json_both_ways() {
        let (ui, mut bridge) = channel(selected("<svg/>"));
        ui.send(&PluginMessage::GetSelectionSvg).unwrap();
        ui.send(&PluginMessage::LoadStorage { key: "cache".into() })
            .unwrap();
        assert_eq!(bridge.pump().unwrap(), 2);

        let responses = ui.drain().unwrap();
        assert_eq!(responses.len(), 2);
        assert!(matches!(responses[0], PluginMessage::SelectionSvg { .. }));
        assert!(matches!(responses[1], PluginMessage::StorageLoaded { .. }));
        assert_eq!(bridge.pump().unwrap(), 0);
    }

    #[test]
    fn responses_sent_as_requests_are_ignored() {
        let mut service = selected("<svg/>");
        assert!(service.handle(PluginMessage::NoSelection).is_empty());
        assert!(service
            .handle(PluginMessage::Notify {
                message: "hi".into()
            })
            .is_empty());
    }
}
