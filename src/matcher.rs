use std::{collections::BTreeSet, fmt::Debug, ops::BitAnd, sync::Arc};

use crate::interaction::{Interaction, InteractionRequest};

/// Decides whether a live request is answered by a recorded one.
///
/// Matchers combine with `&`, which flattens into one ordered [`Matcher::All`]:
/// ```
/// use grpcvcr::matcher::Matcher;
///
/// let matcher = Matcher::Method & Matcher::Request & Matcher::metadata();
/// assert!(matches!(&matcher, Matcher::All(matchers) if matchers.len() == 3));
/// ```
#[derive(Debug, Clone, Default)]
pub enum Matcher {
    /// Same method path.
    #[default]
    Method,
    /// Byte-identical request body.
    Request,
    Metadata(MetadataMatcher),
    Custom(CustomMatcher),
    /// Every matcher, in order.
    All(Vec<Matcher>),
}
impl Matcher {
    pub fn metadata() -> Self {
        Self::Metadata(MetadataMatcher::default())
    }

    pub fn metadata_keys<I: IntoIterator<Item = S>, S: Into<String>>(keys: I) -> Self {
        Self::Metadata(MetadataMatcher::keys(keys))
    }

    pub fn metadata_ignoring<I: IntoIterator<Item = S>, S: Into<String>>(keys: I) -> Self {
        Self::Metadata(MetadataMatcher::ignore_keys(keys))
    }

    pub fn custom<F>(predicate: F) -> Self
    where
        F: Fn(&InteractionRequest, &InteractionRequest) -> bool + Send + Sync + 'static,
    {
        Self::Custom(CustomMatcher::new(predicate))
    }

    pub fn matches(&self, request: &InteractionRequest, recorded: &InteractionRequest) -> bool {
        match self {
            Self::Method => request.method == recorded.method,
            Self::Request => request.body == recorded.body,
            Self::Metadata(matcher) => matcher.matches(request, recorded),
            Self::Custom(matcher) => matcher.matches(request, recorded),
            Self::All(matchers) => matchers.iter().all(|m| m.matches(request, recorded)),
        }
    }
}
impl BitAnd for Matcher {
    type Output = Matcher;
    fn bitand(self, rhs: Self) -> Self::Output {
        match self {
            Self::All(mut matchers) => {
                matchers.push(rhs);
                Self::All(matchers)
            }
            lhs => Self::All(vec![lhs, rhs]),
        }
    }
}

/// Compares request metadata. With `keys` only those keys are compared, otherwise every key seen on either
/// side except `ignore_keys`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MetadataMatcher {
    pub keys: Option<Vec<String>>,
    pub ignore_keys: Vec<String>,
}
impl MetadataMatcher {
    pub fn keys<I: IntoIterator<Item = S>, S: Into<String>>(keys: I) -> Self {
        Self { keys: Some(keys.into_iter().map(Into::into).collect()), ignore_keys: Vec::new() }
    }

    pub fn ignore_keys<I: IntoIterator<Item = S>, S: Into<String>>(keys: I) -> Self {
        Self { keys: None, ignore_keys: keys.into_iter().map(Into::into).collect() }
    }

    pub fn matches(&self, request: &InteractionRequest, recorded: &InteractionRequest) -> bool {
        let (live, stored) = (&request.metadata, &recorded.metadata);
        match &self.keys {
            Some(keys) => keys.iter().all(|key| live.get(key) == stored.get(key)),
            None => {
                let union: BTreeSet<_> = live.keys().chain(stored.keys()).collect();
                union
                    .into_iter()
                    .filter(|key| !self.ignore_keys.iter().any(|ignored| ignored == key))
                    .all(|key| live.get(key) == stored.get(key))
            }
        }
    }
}

type Predicate = dyn Fn(&InteractionRequest, &InteractionRequest) -> bool + Send + Sync;

/// Caller supplied predicate over `(live, recorded)` requests.
#[derive(Clone)]
pub struct CustomMatcher {
    predicate: Arc<Predicate>,
    name: Option<String>,
}
impl CustomMatcher {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&InteractionRequest, &InteractionRequest) -> bool + Send + Sync + 'static,
    {
        Self { predicate: Arc::new(predicate), name: None }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn matches(&self, request: &InteractionRequest, recorded: &InteractionRequest) -> bool {
        (self.predicate)(request, recorded)
    }
}
impl Debug for CustomMatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CustomMatcher").field("name", &self.name.as_deref().unwrap_or("<predicate>")).finish()
    }
}

/// First interaction, in recorded order, whose request satisfies `matcher`.
pub fn find_matching_interaction<'a>(
    request: &InteractionRequest,
    interactions: &'a [Interaction],
    matcher: &Matcher,
) -> Option<&'a Interaction> {
    interactions.iter().find(|interaction| matcher.matches(request, interaction.request()))
}
