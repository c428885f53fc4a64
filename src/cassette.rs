use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use crate::{
    error::{VcrError, VcrResult},
    interaction::{CassetteData, Interaction, InteractionRequest},
    matcher::{find_matching_interaction, Matcher},
    record_mode::RecordMode,
    serialization::CassetteSerializer,
};

/// A set of recorded interactions bound to one file.
///
/// Lookups and writes share one lock, but a `find` racing a `record` may observe the cassette before or after
/// the write.
#[derive(Debug)]
pub struct Cassette {
    path: PathBuf,
    record_mode: RecordMode,
    matcher: Matcher,
    state: Mutex<CassetteState>,
}
#[derive(Debug, Default)]
struct CassetteState {
    data: CassetteData,
    dirty: bool,
}
impl Cassette {
    /// Load the cassette at `path`. A missing file is an empty cassette unless the mode is [`RecordMode::None`].
    pub fn load<P: Into<PathBuf>>(path: P, record_mode: RecordMode, matcher: Matcher) -> VcrResult<Self> {
        let path = path.into();
        let data = match CassetteSerializer::load(&path) {
            Ok(data) => data,
            Err(VcrError::CassetteNotFound { .. }) if record_mode != RecordMode::None => CassetteData::default(),
            Err(e) => return Err(e),
        };
        tracing::debug!(path = %path.display(), %record_mode, interactions = data.interactions.len(), "load cassette");
        Ok(Self::with_data(path, record_mode, matcher, data))
    }

    pub fn with_data<P: Into<PathBuf>>(path: P, record_mode: RecordMode, matcher: Matcher, data: CassetteData) -> Self {
        Self { path: path.into(), record_mode, matcher, state: Mutex::new(CassetteState { data, dirty: false }) }
    }

    fn state(&self) -> MutexGuard<'_, CassetteState> {
        self.state.lock().unwrap_or_else(|poisoned| {
            tracing::warn!(path = %self.path.display(), "cassette lock was poisoned");
            poisoned.into_inner()
        })
    }

    pub fn find(&self, request: &InteractionRequest) -> Option<Interaction> {
        find_matching_interaction(request, &self.state().data.interactions, &self.matcher).cloned()
    }

    pub fn get_response(&self, request: &InteractionRequest) -> VcrResult<Interaction> {
        let state = self.state();
        match find_matching_interaction(request, &state.data.interactions, &self.matcher) {
            Some(interaction) => Ok(interaction.clone()),
            None if !self.can_record() => Err(VcrError::RecordingDisabled { method: request.method.clone() }),
            None => Err(VcrError::NoMatchingInteraction {
                method: request.method.clone(),
                available: state.data.interactions.iter().map(|i| i.method().to_string()).collect(),
            }),
        }
    }

    /// Append `interaction`. Under [`RecordMode::All`] every stored interaction matching its request is dropped first.
    pub fn record(&self, interaction: Interaction) {
        let mut state = self.state();
        if self.record_mode == RecordMode::All {
            let before = state.data.interactions.len();
            state.data.interactions.retain(|recorded| !self.matcher.matches(interaction.request(), recorded.request()));
            let replaced = before - state.data.interactions.len();
            if replaced > 0 {
                tracing::debug!(method = interaction.method(), replaced, "drop overwritten interactions");
            }
        }
        tracing::info!(method = interaction.method(), rpc_type = %interaction.rpc_type(), "record interaction");
        state.data.interactions.push(interaction);
        state.dirty = true;
    }

    /// Write the cassette if anything was recorded since the last save.
    pub fn save(&self) -> VcrResult<()> {
        let mut state = self.state();
        if !state.dirty {
            return Ok(());
        }
        CassetteSerializer::save(&self.path, &state.data)?;
        state.dirty = false;
        tracing::info!(path = %self.path.display(), interactions = state.data.interactions.len(), "save cassette");
        Ok(())
    }

    pub fn can_record(&self) -> bool {
        self.record_mode.can_record()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn record_mode(&self) -> RecordMode {
        self.record_mode
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.state().data.interactions.clone()
    }

    pub fn len(&self) -> usize {
        self.state().data.interactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_dirty(&self) -> bool {
        self.state().dirty
    }
}
