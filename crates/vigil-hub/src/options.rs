use std::sync::Arc;
use std::time::Duration;

use crate::sink::Sink;

/// Per-call routing and policy options for [`crate::Hub::notify`].
///
/// Later options override earlier ones targeting the same selector; the
/// filter variants replace one another, while `AlsoSinks` accumulates.
#[derive(Clone)]
pub enum NotifyOption {
    /// Ask sinks to bypass dedup for this delivery.
    SkipCooldown(bool),
    /// Route only to the registered sink with this name.
    OnlyNamed(String),
    /// Route only to this instance, registered or not.
    OnlyInstance(Arc<dyn Sink>),
    /// Route only to these instances, registered or not.
    OnlyInstances(Vec<Arc<dyn Sink>>),
    NameHasPrefix(String),
    NameHasSuffix(String),
    NameContains(String),
    /// Deliver to these sinks in addition to the filtered set.
    AlsoSinks(Vec<Arc<dyn Sink>>),
    /// Override the sink's default cooldown TTL for this call.
    Cooldown(Duration),
}

pub(crate) enum Filter {
    All,
    Named(String),
    Instances(Vec<Arc<dyn Sink>>),
    Prefix(String),
    Suffix(String),
    Contains(String),
}

impl Filter {
    pub(crate) fn matches(&self, name: &str) -> bool {
        match self {
            Filter::All => true,
            Filter::Named(wanted) => name == wanted,
            Filter::Instances(_) => false,
            Filter::Prefix(p) => name.starts_with(p.as_str()),
            Filter::Suffix(s) => name.ends_with(s.as_str()),
            Filter::Contains(c) => name.contains(c.as_str()),
        }
    }
}

/// The folded view of an option list.
pub(crate) struct ResolvedOptions {
    pub(crate) skip_cooldown: bool,
    pub(crate) cooldown: Option<Duration>,
    pub(crate) filter: Filter,
    pub(crate) also: Vec<Arc<dyn Sink>>,
}

pub(crate) fn resolve(options: &[NotifyOption]) -> ResolvedOptions {
    let mut resolved = ResolvedOptions {
        skip_cooldown: false,
        cooldown: None,
        filter: Filter::All,
        also: Vec::new(),
    };
    for option in options {
        match option {
            NotifyOption::SkipCooldown(skip) => resolved.skip_cooldown = *skip,
            NotifyOption::Cooldown(ttl) => resolved.cooldown = Some(*ttl),
            NotifyOption::OnlyNamed(name) => resolved.filter = Filter::Named(name.clone()),
            NotifyOption::OnlyInstance(sink) => {
                resolved.filter = Filter::Instances(vec![sink.clone()]);
            }
            NotifyOption::OnlyInstances(sinks) => {
                resolved.filter = Filter::Instances(sinks.clone());
            }
            NotifyOption::NameHasPrefix(p) => resolved.filter = Filter::Prefix(p.clone()),
            NotifyOption::NameHasSuffix(s) => resolved.filter = Filter::Suffix(s.clone()),
            NotifyOption::NameContains(c) => resolved.filter = Filter::Contains(c.clone()),
            NotifyOption::AlsoSinks(sinks) => resolved.also.extend(sinks.iter().cloned()),
        }
    }
    resolved
}
