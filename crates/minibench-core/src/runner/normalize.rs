//! Caller settings → owned validation requests.

use minibench_store::AccelerationSettings;

use crate::request::ValidationRequest;

/// Deep-copy every settings reference into an owned request.
///
/// The returned requests double as the comparison objects the reconciler
/// matches completions against.
pub(crate) fn normalize<'a, I>(for_settings: I) -> Vec<ValidationRequest>
where
    I: IntoIterator<Item = &'a AccelerationSettings>,
{
    for_settings
        .into_iter()
        .map(|settings| ValidationRequest::new(settings.clone()))
        .collect()
}
