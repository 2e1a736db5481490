//! Labelled loggers declared up front and built once per module.

use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    sync::Mutex,
};

use lazy_static::lazy_static;

use crate::{params::Params, record::short_type_name, structured::StructuredLogger};

const TOKEN_PREFIX: &str = "StructuredLogger:";

lazy_static! {
    static ref LABELS: Mutex<BTreeSet<String>> = Mutex::new(BTreeSet::new());
}

/// Identifies the labelled logger built for one label.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoggerToken(String);

impl LoggerToken {
    /// The label this token was made from.
    pub fn label(&self) -> &str {
        &self.0[TOKEN_PREFIX.len()..]
    }
}

impl fmt::Display for LoggerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The token of `label`. The same label always gives the same token.
pub fn logger_token(label: &str) -> LoggerToken {
    LoggerToken(format!("{}{}", TOKEN_PREFIX, label))
}

/// Declare a labelled logger, to be built by the next
/// [`LoggerProviders::build`], and return its token.
///
/// An empty label asks for a logger labelled after the type it is resolved
/// for; see [`LoggerProviders::resolve`].
pub fn inject_logger(label: &str) -> LoggerToken {
    let mut labels = match LABELS.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    labels.insert(label.to_string());
    logger_token(label)
}

/// Every label declared so far.
pub fn registered_labels() -> Vec<String> {
    match LABELS.lock() {
        Ok(guard) => guard.iter().cloned().collect(),
        Err(poisoned) => poisoned.into_inner().iter().cloned().collect(),
    }
}

/// One facade per declared label, each bound to its label for good.
#[derive(Clone, Debug, Default)]
pub struct LoggerProviders {
    loggers: BTreeMap<LoggerToken, StructuredLogger>,
}

impl LoggerProviders {
    /// Build a facade for every label declared so far.
    pub fn build(params: &Params) -> Self {
        let loggers = registered_labels()
            .into_iter()
            .map(|label| {
                let logger = StructuredLogger::new(params).with_label(label.as_str());
                (logger_token(&label), logger)
            })
            .collect();
        Self { loggers }
    }

    /// The facade built for `token`.
    pub fn get(&self, token: &LoggerToken) -> Option<&StructuredLogger> {
        self.loggers.get(token)
    }

    /// The facade for `token`, as seen by a component of type `T`.
    ///
    /// For the token of the empty label, the facade is labelled with the
    /// short name of `T`.
    ///
    /// ```
    /// use tracing_actix_web_context::{inject_logger, LoggerProviders, Params};
    ///
    /// struct UserService;
    ///
    /// let token = inject_logger("");
    /// let providers = LoggerProviders::build(&Params::default());
    /// let logger = providers.resolve::<UserService>(&token).unwrap();
    /// assert_eq!(logger.label(), Some("UserService"));
    /// ```
    pub fn resolve<T: ?Sized>(&self, token: &LoggerToken) -> Option<StructuredLogger> {
        let logger = self.loggers.get(token)?;
        if token.label().is_empty() {
            Some(
                logger
                    .clone()
                    .with_label(short_type_name(std::any::type_name::<T>())),
            )
        } else {
            Some(logger.clone())
        }
    }

    /// Tokens of all built facades.
    pub fn tokens(&self) -> impl Iterator<Item = &LoggerToken> {
        self.loggers.keys()
    }

    /// Number of built facades.
    pub fn len(&self) -> usize {
        self.loggers.len()
    }

    /// Whether no facade was built.
    pub fn is_empty(&self) -> bool {
        self.loggers.is_empty()
    }
}
