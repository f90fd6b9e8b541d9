//! Replay state machine.
//!
//! Pure state: callers pass the current time in epoch seconds, so every
//! transition is deterministic and testable without a bus or a clock.

use tracing::{debug, info, warn};

use super::catalog::SessionCatalog;
use super::command::ReplayCommand;
use super::cursor::LogCursor;
use crate::error::ServerError;
use crate::proto::{LoadLogRequest, LogEntry, LogList, ReplayerStatus};
use crate::recorder::session::session_id_of;
use crate::topics::matches_any;

/// A session opened for playback.
#[derive(Debug)]
struct LoadedSession {
    log_id: String,
    cursor: LogCursor,
}

/// What the playback loop should do next.
#[derive(Debug)]
pub enum Playback {
    /// Nothing to play until the state changes.
    Idle,
    /// Publish `entry` once `due_in` seconds have passed.
    Entry {
        entry: LogEntry,
        due_in: f64,
        generation: u64,
        seek_epoch: u64,
    },
}

/// Replay engine state.
#[derive(Debug)]
pub struct Replayer {
    catalog: SessionCatalog,
    enabled: bool,
    playing: bool,
    looping: bool,
    loaded: Option<LoadedSession>,
    /// Playback position in recorded time while stopped.
    cursor_time: f64,
    /// `now - cursor_time` at the last stopped-to-playing transition.
    time_offset: Option<f64>,
    /// Bumped on every change that invalidates a scheduled entry.
    generation: u64,
    /// Bumped whenever the cursor is repositioned or replaced.
    seek_epoch: u64,
    /// Session id the recorder reports as open.
    recording: Option<String>,
}

impl Replayer {
    pub fn new(catalog: SessionCatalog) -> Self {
        Self {
            catalog,
            enabled: false,
            playing: false,
            looping: false,
            loaded: None,
            cursor_time: 0.0,
            time_offset: None,
            generation: 0,
            seek_epoch: 0,
            recording: None,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn playing(&self) -> bool {
        self.playing
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn log_id(&self) -> Option<&str> {
        self.loaded.as_ref().map(|s| s.log_id.as_str())
    }

    pub fn time_offset(&self) -> Option<f64> {
        self.time_offset
    }

    /// Playback position in recorded time.
    pub fn playback_time(&self, now: f64) -> f64 {
        match self.time_offset {
            Some(offset) if self.playing => now - offset,
            _ => self.cursor_time,
        }
    }

    /// Note which session the recorder has open.
    pub fn set_recording(&mut self, session_id: Option<String>) {
        self.recording = session_id.filter(|id| !id.is_empty());
    }

    /// Apply one command.
    ///
    /// Everything but `Enable` is ignored while disabled.
    pub fn apply(&mut self, command: ReplayCommand, now: f64) -> Result<(), ServerError> {
        if !self.enabled && !command.bypasses_gate() {
            debug!(command = command.name(), "Replayer disabled, ignoring command");
            return Ok(());
        }

        match command {
            ReplayCommand::Enable => {
                if !self.enabled {
                    info!("Replayer enabled");
                }
                self.enabled = true;
                Ok(())
            }
            ReplayCommand::Disable => {
                info!("Replayer disabled");
                self.enabled = false;
                self.set_playing(false, now)
            }
            ReplayCommand::Load(request) => self.load(request, now),
            ReplayCommand::Loop(looping) => {
                self.looping = looping;
                debug!(looping, "Loop set");
                Ok(())
            }
            ReplayCommand::Start => self.set_playing(true, now),
            ReplayCommand::Stop => self.set_playing(false, now),
            ReplayCommand::Scrub(time) => self.scrub(time, now),
        }
    }

    /// Start or stop playback.
    ///
    /// Only a stopped-to-playing transition recomputes `time_offset`; a
    /// repeated start or stop leaves the schedule untouched.
    pub fn set_playing(&mut self, playing: bool, now: f64) -> Result<(), ServerError> {
        if playing && self.loaded.is_none() {
            return Err(ServerError::bad_request("no log loaded"));
        }
        if self.playing == playing {
            return Ok(());
        }

        if self.playing {
            self.cursor_time = self.playback_time(now);
        }
        if playing {
            self.time_offset = Some(now - self.cursor_time);
        } else {
            self.time_offset = None;
        }
        debug!(playing, cursor_time = self.cursor_time, "Play state changed");
        self.playing = playing;
        self.generation += 1;
        Ok(())
    }

    fn load(&mut self, request: LoadLogRequest, now: f64) -> Result<(), ServerError> {
        self.set_playing(false, now)?;

        let session = match self.catalog.find(&request.log_id) {
            Some(session) => session,
            None => {
                self.catalog.invalidate();
                self.catalog
                    .find(&request.log_id)
                    .ok_or_else(|| ServerError::not_found(format!("log {} not found", request.log_id)))?
            }
        };

        if let Some(recording) = &self.recording {
            if session_id_of(&session.id) == recording {
                return Err(ServerError::conflict(format!(
                    "log {} is still being recorded",
                    request.log_id
                )));
            }
        }

        let mut cursor = LogCursor::open(&session.path).map_err(|e| {
            ServerError::internal(format!("cannot open log {}: {}", request.log_id, e))
        })?;
        self.cursor_time = cursor.start_time();
        self.seek_epoch += 1;
        self.looping = request.looping;
        self.loaded = Some(LoadedSession {
            log_id: session.id,
            cursor,
        });
        info!(
            log_id = %request.log_id,
            looping = request.looping,
            autoplay = request.autoplay,
            "Loaded log"
        );

        self.set_playing(request.autoplay, now)
    }

    /// Pause, move the cursor to `time`, and resume the previous play state.
    ///
    /// Targets before the session start land on the start.
    pub fn scrub(&mut self, time: f64, now: f64) -> Result<(), ServerError> {
        let Some(session) = self.loaded.as_mut() else {
            return Err(ServerError::bad_request("no log loaded"));
        };
        if !time.is_finite() {
            return Err(ServerError::bad_request(format!("invalid scrub time {}", time)));
        }
        let time = time.max(session.cursor.start_time());
        let was_playing = self.playing;
        self.playing = false;
        self.time_offset = None;

        session
            .cursor
            .seek_time(time)
            .map_err(|e| ServerError::internal(format!("seek failed: {}", e)))?;
        self.cursor_time = time;
        self.seek_epoch += 1;
        debug!(time, "Scrubbed");

        self.set_playing(was_playing, now)
    }

    /// Next entry to publish, skipping excluded topics.
    ///
    /// Reaching the end either wraps to the session start (looping) or
    /// stops playback.
    pub fn next_playback<P: AsRef<[u8]>>(
        &mut self,
        excluded: &[P],
        now: f64,
    ) -> Result<Playback, ServerError> {
        let mut wrapped = false;
        loop {
            if !self.enabled || !self.playing {
                return Ok(Playback::Idle);
            }
            let Some(session) = self.loaded.as_mut() else {
                return Ok(Playback::Idle);
            };

            let next = session.cursor.next_entry().map_err(|e| {
                ServerError::internal(format!("cannot read log {}: {}", session.log_id, e))
            });
            let next = match next {
                Ok(next) => next,
                Err(e) => {
                    self.set_playing(false, now)?;
                    return Err(e);
                }
            };

            match next {
                Some(entry) if matches_any(&entry.topic, excluded) => continue,
                Some(entry) => {
                    let offset = self.time_offset.unwrap_or(now - self.cursor_time);
                    let due_in = entry.log_mono_time + offset - now;
                    return Ok(Playback::Entry {
                        entry,
                        due_in,
                        generation: self.generation,
                        seek_epoch: self.seek_epoch,
                    });
                }
                None if self.looping && !wrapped => {
                    wrapped = true;
                    let start = session.cursor.start_time();
                    debug!(start, "End of log, looping");
                    self.scrub(start, now)?;
                }
                None => {
                    if self.looping {
                        warn!("Looping log has nothing to play, stopping");
                    } else {
                        info!("End of log");
                    }
                    self.set_playing(false, now)?;
                    return Ok(Playback::Idle);
                }
            }
        }
    }

    /// Whether an entry scheduled under `generation` may still be published.
    pub fn is_current(&self, generation: u64) -> bool {
        self.generation == generation && self.playing && self.enabled
    }

    /// Hand back an entry that was fetched but not published.
    ///
    /// Dropped when the cursor moved since it was fetched.
    pub fn push_back(&mut self, entry: LogEntry, seek_epoch: u64) {
        if seek_epoch != self.seek_epoch {
            return;
        }
        if let Some(session) = self.loaded.as_mut() {
            session.cursor.push_back(entry);
        }
    }

    /// Status snapshot.
    pub fn status(&mut self, now: f64) -> ReplayerStatus {
        let time = self.playback_time(now);
        let (log_id, start_time, end_time) = match self.loaded.as_mut() {
            Some(session) => (
                session.log_id.clone(),
                session.cursor.start_time(),
                session.cursor.end_time(),
            ),
            None => (String::new(), 0.0, 0.0),
        };
        ReplayerStatus {
            enabled: self.enabled,
            playing: self.playing,
            time,
            log_id,
            start_time,
            end_time,
            looping: self.looping,
        }
    }

    /// Freshly scanned session list.
    pub fn log_list(&mut self) -> LogList {
        self.catalog.log_list()
    }
}
