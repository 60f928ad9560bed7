//! Host filesystem events as seen by a mount watcher.

use std::path::PathBuf;

use notify::event::{EventKind, ModifyKind, RenameMode};

/// Raw host filesystem change under a watched source directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsEvent {
    Created(PathBuf),
    Modified(PathBuf),
    Renamed { from: PathBuf, to: PathBuf },
    Removed(PathBuf),
}

impl FsEvent {
    /// Map a `notify` event onto zero or more watcher events.
    ///
    /// Metadata-only and access notifications are dropped: the watcher follows
    /// content and names only, which also keeps the forwarded `chmod` from
    /// echoing back as a host change.
    pub fn from_notify(event: notify::Event) -> Vec<FsEvent> {
        let paired = event.attrs.tracker().is_some();
        let notify::Event { kind, paths, .. } = event;

        match kind {
            EventKind::Create(_) => paths.into_iter().map(FsEvent::Created).collect(),
            EventKind::Remove(_) => paths.into_iter().map(FsEvent::Removed).collect(),
            EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
            EventKind::Modify(ModifyKind::Name(mode)) => Self::from_rename(mode, paths, paired),
            EventKind::Modify(_) => paths.into_iter().map(FsEvent::Modified).collect(),
            EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
        }
    }

    /// `paired` halves carry a rename cookie; the backend also reports them
    /// together as one `Both` event, so only that one is kept.
    fn from_rename(mode: RenameMode, paths: Vec<PathBuf>, paired: bool) -> Vec<FsEvent> {
        match mode {
            RenameMode::Both => {
                let mut paths = paths.into_iter();
                match (paths.next(), paths.next()) {
                    (Some(from), Some(to)) => vec![FsEvent::Renamed { from, to }],
                    (Some(only), None) => vec![FsEvent::Modified(only)],
                    _ => Vec::new(),
                }
            }
            RenameMode::From | RenameMode::To if paired => Vec::new(),
            RenameMode::From => paths.into_iter().map(FsEvent::Removed).collect(),
            RenameMode::To => paths.into_iter().map(FsEvent::Created).collect(),
            // Backends that cannot tell the halves apart report each path on its own.
            RenameMode::Any | RenameMode::Other => paths
                .into_iter()
                .map(|path| {
                    if path.exists() {
                        FsEvent::Created(path)
                    } else {
                        FsEvent::Removed(path)
                    }
                })
                .collect(),
        }
    }
}
