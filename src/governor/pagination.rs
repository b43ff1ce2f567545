//! Pagination ceilings, enforced before dispatch.

use crate::config::{PageLimits, PaginationConfig};
use crate::error::{GovernorError, GovernorResult, PaginationField};
use crate::governor::request::{Resource, SearchRequest};

/// A resolved page: explicit values or configured defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

pub fn limits_for(resource: Resource, config: &PaginationConfig) -> PageLimits {
    match resource {
        Resource::Projects => config.projects,
        Resource::Publications => config.publications,
    }
}

/// Resolve `request`'s page against `config`, rejecting values past the
/// resource's ceilings.
///
/// Offset is checked first. The default limit is clamped to the resource's
/// ceiling; an explicit limit over the ceiling is an error.
pub fn resolve_page(request: &SearchRequest, config: &PaginationConfig) -> GovernorResult<Page> {
    let limits = limits_for(request.resource, config);
    let offset = request.offset.unwrap_or(0);
    if offset > limits.max_offset {
        return Err(GovernorError::PaginationLimitExceeded {
            resource: request.resource,
            field: PaginationField::Offset,
            value: offset,
            max: limits.max_offset,
        });
    }

    let limit = match request.limit {
        Some(limit) if limit > limits.max_limit => {
            return Err(GovernorError::PaginationLimitExceeded {
                resource: request.resource,
                field: PaginationField::Limit,
                value: limit,
                max: limits.max_limit,
            });
        }
        Some(limit) => limit,
        None => config.default_limit.min(limits.max_limit),
    };

    Ok(Page { offset, limit })
}
