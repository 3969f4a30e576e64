//! String-level handling of content digests.
//!
//! Registries, the container runtime and image configs all spell digests slightly differently
//! (`sha256:abc`, `abc`, `repo@sha256:abc`, trailing whitespace from headers). Everything here
//! brings them to a comparable form. Nothing is hashed.

//--------------------------------------------------------------------------------------------------
// Constants
//--------------------------------------------------------------------------------------------------

/// Number of characters kept by [`short`].
pub const SHORT_DIGEST_LEN: usize = 12;

/// Minimum length of the encoded part of a digest (sha256 is 64, the shortest registered is 32).
pub const MIN_ENCODED_LEN: usize = 32;

//--------------------------------------------------------------------------------------------------
// Functions
//--------------------------------------------------------------------------------------------------

/// Strips surrounding whitespace and an optional `algorithm:` prefix from a digest.
///
/// ## Examples
///
/// ```
/// use monoupdate::oci::digest;
///
/// assert_eq!(digest::normalize(" sha256:abc \n"), "abc");
/// assert_eq!(digest::normalize("abc"), "abc");
/// assert_eq!(digest::normalize(digest::normalize("sha512:def")), "def");
/// ```
pub fn normalize(digest: &str) -> &str {
    let trimmed = digest.trim();
    match trimmed.split_once(':') {
        Some((algorithm, hex)) if is_algorithm(algorithm) => hex.trim(),
        _ => trimmed,
    }
}

/// Returns true if any of the runtime's recorded repo digests names the remote digest.
///
/// Entries may be `repository@algorithm:hex` pairs or bare digests. An empty list never matches.
pub fn matches<S: AsRef<str>>(local_repo_digests: &[S], remote_digest: &str) -> bool {
    let remote = normalize(remote_digest);
    if remote.is_empty() {
        return false;
    }

    local_repo_digests
        .iter()
        .any(|entry| normalize(digest_part(entry.as_ref())) == remote)
}

/// Returns the first [`SHORT_DIGEST_LEN`] characters of the normalized digest.
pub fn short(digest: &str) -> String {
    normalize(digest).chars().take(SHORT_DIGEST_LEN).collect()
}

/// Returns the digest portion of a `repository@digest` pair, or the input if it has no `@`.
pub fn digest_part(repo_digest: &str) -> &str {
    repo_digest
        .rsplit_once('@')
        .map(|(_, digest)| digest)
        .unwrap_or(repo_digest)
}

/// Returns the repository portion of a `repository@digest` pair.
pub fn repository_part(repo_digest: &str) -> Option<&str> {
    repo_digest.rsplit_once('@').map(|(repository, _)| repository)
}

/// Returns true if the string looks like a bare content digest, e.g. `sha256:<64 hex>`.
///
/// Encoded parts shorter than [`MIN_ENCODED_LEN`] are rejected so that `host:port` is never
/// mistaken for a digest.
pub fn is_digest(reference: &str) -> bool {
    match reference.trim().split_once(':') {
        Some((algorithm, hex)) => {
            is_algorithm(algorithm)
                && hex.len() >= MIN_ENCODED_LEN
                && hex.chars().all(|c| c.is_ascii_hexdigit())
        }
        None => false,
    }
}

/// Algorithm identifiers are lowercase alphanumerics, optionally with `+._-` separators.
fn is_algorithm(candidate: &str) -> bool {
    !candidate.is_empty()
        && candidate.starts_with(|c: char| c.is_ascii_lowercase())
        && candidate
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || "+._-".contains(c))
}

//--------------------------------------------------------------------------------------------------
// Tests
//--------------------------------------------------------------------------------------------------
