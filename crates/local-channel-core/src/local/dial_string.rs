//! `exten[/options][@context]` dial strings

use std::fmt;

use tracing::error;

use crate::error::{LocalChannelError, Result};

/// Options that may follow the `/` in a dial string
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DialOptions {
    /// `n`: never optimize the pair out of a bridge
    pub no_optimization: bool,
    /// `j`: enable the jitter buffer on the owner (only together with `n`)
    pub jitterbuffer: bool,
    /// `b`: report the far side of the pair when asked for a bridge peer
    pub bridge: bool,
    /// `m`: relay hold/unhold instead of playing music on hold locally
    pub moh_passthru: bool,
}

/// A parsed local channel dial string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialString {
    pub exten: String,
    pub context: String,
    pub options: DialOptions,
}

impl DialString {
    /// Parse `data`, filling in `default_context` when no `@context` is given.
    ///
    /// The context may appear either before or after the options, so
    /// `100@default/n` and `100/n@default` are equivalent.
    pub fn parse(data: &str, default_context: &str) -> Result<Self> {
        let (target, opts) = match data.split_once('/') {
            Some((target, opts)) => (target, Some(opts)),
            None => (data, None),
        };

        let (exten, mut context) = match target.split_once('@') {
            Some((exten, context)) => (exten, Some(context)),
            None => (target, None),
        };

        let mut options = DialOptions::default();
        if let Some(opts) = opts {
            let flags = match opts.split_once('@') {
                Some((flags, trailing_context)) => {
                    if context.is_none() {
                        context = Some(trailing_context);
                    }
                    flags
                }
                None => opts,
            };
            options.no_optimization = flags.contains('n');
            if flags.contains('j') {
                if options.no_optimization {
                    options.jitterbuffer = true;
                } else {
                    error!(
                        "You must use the 'n' option for chan_local to use the 'j' option to enable the jitterbuffer"
                    );
                }
            }
            options.bridge = flags.contains('b');
            options.moh_passthru = flags.contains('m');
        }

        if exten.is_empty() {
            return Err(LocalChannelError::InvalidDialString(data.to_string()));
        }

        let context = match context {
            Some(c) if !c.is_empty() => c,
            _ => default_context,
        };

        Ok(Self {
            exten: exten.to_string(),
            context: context.to_string(),
            options,
        })
    }
}

impl fmt::Display for DialString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.exten, self.context)
    }
}
