//! Filesystem helpers shared by the repositories.

use std::path::Path;

use tracing::trace;

use crate::error::MetaResult;

/// Make a bucket name or object key safe to use as a single path component.
///
/// Replaces `/`, `\`, and `..` with `_`. This is filesystem safety only;
/// upstream name validation is stricter.
///
/// # Examples
///
/// ```
/// use strata_meta::util::sanitize_component;
///
/// assert_eq!(sanitize_component("a/b"), "a_b");
/// assert_eq!(sanitize_component("..\\evil"), "__evil");
/// assert_eq!(sanitize_component("plain-name"), "plain-name");
/// ```
#[must_use]
pub fn sanitize_component(name: &str) -> String {
    name.replace('/', "_").replace('\\', "_").replace("..", "_")
}

/// Write `data` to `path` atomically: write `<path>.tmp`, then rename over
/// the final name. Readers either see the old content or the new content,
/// never a partial file. The temp file is removed if the rename fails.
pub async fn write_atomic(path: &Path, data: &[u8]) -> MetaResult<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = std::path::PathBuf::from(tmp);

    tokio::fs::write(&tmp, data).await?;
    if let Err(e) = tokio::fs::rename(&tmp, path).await {
        let _ = tokio::fs::remove_file(&tmp).await;
        return Err(e.into());
    }

    trace!(path = %path.display(), bytes = data.len(), "wrote descriptor atomically");
    Ok(())
}
