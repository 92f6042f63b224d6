//! Subject resolution.
//!
//! Subjects are dot-separated token sequences of the form
//! `<PREFIX>.<projectId>[.<datasetId>[.<objectGroupId>]][.*]` where the optional
//! trailing `*` is a single-token wildcard matching exactly one additional token.
//! Publication always targets the exact resource subject; the wildcard is purely a
//! subscription-side concept.

use anyhow::{bail, Result};
use uuid::Uuid;

use crate::catalog::{CatalogStore, ParentChain};
use crate::error::AppError;
use crate::grpc::ResourceKind;

/// The single-token wildcard of the subject grammar.
pub const TOKEN_WILDCARD: &str = "*";
/// The token separator of the subject grammar.
pub const TOKEN_SEPARATOR: char = '.';

/// Resolve the subject of the given resource.
///
/// This routine is pure with respect to its inputs and the catalog snapshot it reads,
/// and performs no caching: two resolutions over an unchanged catalog yield identical
/// strings.
pub fn resolve_subject(catalog: &CatalogStore, prefix: &str, kind: ResourceKind, resource_id: &str, include_sub_resources: bool) -> Result<String> {
    let id = parse_resource_id(resource_id)?;
    let chain = resource_chain(catalog, kind, &id)?;
    Ok(subject_from_chain(prefix, &chain, include_sub_resources))
}

/// Resolve the parent chain of the given resource from the catalog.
pub fn resource_chain(catalog: &CatalogStore, kind: ResourceKind, id: &Uuid) -> Result<ParentChain> {
    match kind {
        ResourceKind::Project => catalog.project_chain(id),
        ResourceKind::Dataset => catalog.dataset_chain(id),
        ResourceKind::ObjectGroup => catalog.object_group_chain(id),
        ResourceKind::Unspecified => bail!(AppError::InvalidInput("unknown resource kind".into())),
    }
}

/// Build a subject string from a resolved parent chain.
pub fn subject_from_chain(prefix: &str, chain: &ParentChain, include_sub_resources: bool) -> String {
    let mut subject = format!("{}{}{}", prefix, TOKEN_SEPARATOR, chain.project_id);
    if let Some(dataset_id) = &chain.dataset_id {
        subject.push(TOKEN_SEPARATOR);
        subject.push_str(&dataset_id.to_string());
    }
    if let Some(object_group_id) = &chain.object_group_id {
        subject.push(TOKEN_SEPARATOR);
        subject.push_str(&object_group_id.to_string());
    }
    if include_sub_resources {
        subject.push(TOKEN_SEPARATOR);
        subject.push_str(TOKEN_WILDCARD);
    }
    subject
}

/// Check if the given subject filter matches the given concrete subject.
///
/// Tokens are compared position-wise; a trailing `*` in the filter matches exactly one
/// additional token. Concrete subjects never carry wildcards.
pub fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split(TOKEN_SEPARATOR).peekable();
    let mut subject_tokens = subject.split(TOKEN_SEPARATOR);
    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (None, None) => return true,
            (Some(TOKEN_WILDCARD), Some(_)) => {
                // The wildcard is only valid as the final filter token, and consumes
                // exactly one subject token.
                return filter_tokens.peek().is_none() && subject_tokens.next().is_none();
            }
            (Some(want), Some(have)) if want == have => continue,
            _ => return false,
        }
    }
}

/// Parse the given resource ID as a UUID, erroring with `InvalidInput` on failure.
pub fn parse_resource_id(resource_id: &str) -> Result<Uuid> {
    match Uuid::parse_str(resource_id) {
        Ok(id) => Ok(id),
        Err(_) => bail!(AppError::InvalidInput(format!("resource ID is not a valid UUID: {}", resource_id))),
    }
}
