//! Tunedeck Core - Music library and playback session
//!
//! This crate provides the core of the player: the persisted library of
//! favorites and playlists, the play queue, the playback state machine and
//! seek gesture handling, plus a filesystem media index to feed them.

pub mod command;
pub mod engine;
pub mod library;
pub mod media;
pub mod player;
pub mod probe;
pub mod queue;
pub mod seek;
pub mod storage;
pub mod store;
pub mod track;

pub use command::{ Command, CommandError };
pub use engine::{ AudioEngine, ClockEngine, EngineError, EngineEvent, PositionTick };
pub use library::DirectoryIndex;
pub use media::{ fetch_all, Album, MediaIndex, MediaIndexError, Page, PageRequest };
pub use player::{ PlaybackMachine, PlayerError, TransportState };
pub use queue::{ Queue, QueueError, RepeatMode };
pub use seek::SeekGesture;
pub use storage::{ FileStorage, KeyValueStorage, MemoryStorage, StorageError };
pub use store::{ Collection, CollectionItem, LibraryStore, Loaded, Playlist, StoreError };
pub use track::{ format_time, progress_percent, MediaKind, TrackId, TrackRef };
