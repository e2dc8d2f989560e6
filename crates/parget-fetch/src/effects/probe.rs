use tracing::{debug, warn};

use crate::core::{AcceptRanges, accept_ranges, is_success};
use crate::data::{Capability, FetchOptions, RangeUnitPolicy};
use crate::effects::http::{HttpClient, ResponseHead};
use crate::error::{Error, Result, Stage};

/// Ask the server for the resource size and whether it serves byte ranges.
pub async fn probe<C: HttpClient>(
    client: &C,
    url: &str,
    options: &FetchOptions,
) -> Result<Capability> {
    debug!(url, method = %options.probe_method, "probing resource");

    let head = client
        .probe(url, options.probe_method, &options.headers)
        .await
        .map_err(|e| Error::network(Stage::Probe, e))?;

    capability_from(url, &head, options.range_units)
}

/// Interpret a probe response.
pub fn capability_from(
    url: &str,
    head: &ResponseHead,
    policy: RangeUnitPolicy,
) -> Result<Capability> {
    if !is_success(head.status) {
        return Err(Error::HttpStatus {
            stage: Stage::Probe,
            status: head.status,
        });
    }

    let total_size = head.content_length.ok_or_else(|| Error::Probe {
        url: url.to_string(),
    })?;

    let range_supported = match accept_ranges(head.accept_ranges.as_deref()) {
        AcceptRanges::Bytes => true,
        AcceptRanges::Absent | AcceptRanges::None => false,
        AcceptRanges::Other(unit) => match policy {
            RangeUnitPolicy::Strict => return Err(Error::UnsupportedRangeUnit { unit }),
            RangeUnitPolicy::Permissive => {
                warn!(url, unit = %unit, "unknown range unit, treating ranges as unsupported");
                false
            }
        },
    };

    Ok(Capability {
        total_size,
        range_supported,
    })
}
