use std::path::{Component, Path};

/// Reduces a peer-supplied file name to a single safe path component.
///
/// The name a channel reports comes from the remote side and must never be
/// able to place the download outside the chosen directory. Takes the last
/// normal component of the reported name; rejects names that contain no
/// usable component at all (empty, `..`, `/`, `C:\`).
pub fn sanitize_file_name(reported: &str) -> Option<String> {
    let trimmed = reported.trim();
    if trimmed.is_empty() {
        return None;
    }

    Path::new(trimmed)
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .next_back()
        .map(str::to_owned)
}
