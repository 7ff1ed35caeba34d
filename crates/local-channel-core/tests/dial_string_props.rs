//! Property tests for dial string handling

mod common;

use std::sync::Arc;

use local_channel_core::local::LocalPair;
use local_channel_core::prelude::*;
use proptest::prelude::*;

fn exten() -> impl Strategy<Value = String> {
    "[0-9a-zA-Z*#+_]{1,8}"
}

fn context() -> impl Strategy<Value = String> {
    "[a-z][a-z0-9-]{0,10}"
}

fn options() -> impl Strategy<Value = String> {
    prop::sample::subsequence(vec!['n', 'j', 'b', 'm'], 0..=4).prop_map(|flags| flags.into_iter().collect())
}

/// Render the dial string with the options before or after the context
fn render(exten: &str, context: Option<&str>, opts: &str, options_first: bool) -> String {
    match (context, opts.is_empty()) {
        (None, true) => exten.to_string(),
        (None, false) => format!("{}/{}", exten, opts),
        (Some(c), true) => format!("{}@{}", exten, c),
        (Some(c), false) if options_first => format!("{}/{}@{}", exten, opts, c),
        (Some(c), false) => format!("{}@{}/{}", exten, c, opts),
    }
}

proptest! {
    #[test]
    fn prop_parse_recovers_parts(
        exten in exten(),
        context in prop::option::of(context()),
        opts in options(),
        options_first in any::<bool>(),
    ) {
        let data = render(&exten, context.as_deref(), &opts, options_first);
        let dial = DialString::parse(&data, "fallback").unwrap();

        prop_assert_eq!(&dial.exten, &exten);
        prop_assert_eq!(dial.context.as_str(), context.as_deref().unwrap_or("fallback"));
        prop_assert_eq!(dial.options.no_optimization, opts.contains('n'));
        prop_assert_eq!(dial.options.jitterbuffer, opts.contains('j') && opts.contains('n'));
        prop_assert_eq!(dial.options.bridge, opts.contains('b'));
        prop_assert_eq!(dial.options.moh_passthru, opts.contains('m'));
    }

    #[test]
    fn prop_empty_extension_rejected(context in context(), opts in options()) {
        let data = render("", Some(&context), &opts, false);
        prop_assert!(DialString::parse(&data, "default").is_err());
    }

    #[test]
    fn prop_request_places_both_endpoints(
        exten in exten(),
        context in context(),
        opts in options(),
    ) {
        let driver = LocalChannelDriver::new(common::test_config(), Arc::new(StaticDialplan::new())).unwrap();
        let data = render(&exten, Some(&context), &opts, false);
        let owner = driver.request(&data, FormatCapabilities::all(), None).unwrap();
        let pair: Arc<LocalPair> = driver.pair_of(&owner).unwrap();
        let chan = pair.lock().chan.clone().unwrap();

        let prefix = format!("Local/{}@{}-", exten, context);
        prop_assert!(pair.name().starts_with(&prefix));
        prop_assert_eq!(owner.name().to_string(), format!("{};1", pair.name()));
        prop_assert_eq!(chan.name().to_string(), format!("{};2", pair.name()));
        for endpoint in [&owner, &chan] {
            let inner = endpoint.lock();
            prop_assert_eq!(&inner.exten, &exten);
            prop_assert_eq!(&inner.context, &context);
        }
        prop_assert_eq!(
            pair.flags().contains(PairFlags::NO_OPTIMIZATION),
            opts.contains('n')
        );

        owner.hangup().unwrap();
        prop_assert!(pair.is_destroyed());
        prop_assert!(driver.registry().is_empty());
    }
}
