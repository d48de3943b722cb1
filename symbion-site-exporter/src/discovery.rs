//! Site discovery for ISPConfig-style hosting trees
//!
//! Layout scanned under the configured root:
//! `<root>/<client>/web*/ssl/<domain>-le.crt`
//!
//! - Each `web*` directory below a client directory is one site
//! - The site name is taken from the first Let's Encrypt certificate found
//! - Sites without a certificate are reported under [`UNKNOWN_SITE`]

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Name given to sites whose domain cannot be resolved
pub const UNKNOWN_SITE: &str = "Unknown";

const SITE_DIR_PREFIX: &str = "web";
const SSL_DIR: &str = "ssl";
const CERT_SUFFIX: &str = "-le.crt";

#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to read directory {}: {source}", path.display())]
    ReadDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// One hosted site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Site {
    pub name: String,
    pub path: PathBuf,
}

impl Site {
    pub fn is_unknown(&self) -> bool {
        self.name == UNKNOWN_SITE
    }
}

/// Site name -> path, in discovery order.
///
/// Names are unique: inserting an existing name replaces its path in place.
/// All certificate-less sites therefore share a single [`UNKNOWN_SITE`] entry.
#[derive(Debug, Clone, Default)]
pub struct SiteMap {
    sites: Vec<Site>,
}

impl SiteMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a site, returning the path it displaced if the name was taken
    pub fn insert(&mut self, site: Site) -> Option<PathBuf> {
        match self.sites.iter_mut().find(|s| s.name == site.name) {
            Some(existing) => Some(std::mem::replace(&mut existing.path, site.path)),
            None => {
                self.sites.push(site);
                None
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<&Path> {
        self.sites
            .iter()
            .find(|s| s.name == name)
            .map(|s| s.path.as_path())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Site> {
        self.sites.iter()
    }

    pub fn len(&self) -> usize {
        self.sites.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sites.is_empty()
    }
}

impl<'a> IntoIterator for &'a SiteMap {
    type Item = &'a Site;
    type IntoIter = std::slice::Iter<'a, Site>;

    fn into_iter(self) -> Self::IntoIter {
        self.sites.iter()
    }
}

/// Scans a hosting root for sites
#[derive(Debug, Clone)]
pub struct SiteDiscovery {
    root: PathBuf,
}

impl SiteDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Walk the tree and resolve every site.
    ///
    /// Any unreadable directory aborts the whole scan; entries that are not
    /// directories are ignored.
    pub fn discover(&self) -> Result<SiteMap, DiscoveryError> {
        debug!("Discovering sites under {}", self.root.display());

        let mut sites = SiteMap::new();
        for client_path in list_dir(&self.root)? {
            if !client_path.is_dir() {
                continue;
            }

            for site_path in list_dir(&client_path)? {
                let is_site_dir = site_path.file_name().is_some_and(|name| {
                    name.as_encoded_bytes().starts_with(SITE_DIR_PREFIX.as_bytes())
                });
                if !is_site_dir || !site_path.is_dir() {
                    continue;
                }

                let name = resolve_site_name(&site_path)?
                    .unwrap_or_else(|| UNKNOWN_SITE.to_string());
                debug!("Found site: {} ({})", name, site_path.display());

                let site = Site { name: name.clone(), path: site_path.clone() };
                if let Some(previous) = sites.insert(site) {
                    warn!(
                        "Site name {} already taken by {}, now reported for {}",
                        name,
                        previous.display(),
                        site_path.display()
                    );
                }
            }
        }

        debug!("Discovery complete - {} sites", sites.len());
        Ok(sites)
    }
}

/// Domain from the first `*-le.crt` entry in `<site>/ssl`, if any
fn resolve_site_name(site_path: &Path) -> Result<Option<String>, DiscoveryError> {
    let ssl_path = site_path.join(SSL_DIR);
    if !ssl_path.is_dir() {
        return Ok(None);
    }

    // Matched on raw bytes; a non-UTF-8 stem is labelled lossily
    let domain = list_dir(&ssl_path)?
        .iter()
        .filter_map(|entry| entry.file_name())
        .find(|name| name.as_encoded_bytes().ends_with(CERT_SUFFIX.as_bytes()))
        .and_then(|name| domain_from_cert(&name.to_string_lossy()).map(str::to_string));

    Ok(domain)
}

/// `example.org-le.crt` -> `example.org`; a bare `-le.crt` yields nothing
pub fn domain_from_cert(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(CERT_SUFFIX)
        .filter(|domain| !domain.is_empty())
}

fn list_dir(path: &Path) -> Result<Vec<PathBuf>, DiscoveryError> {
    let read_err = |source| DiscoveryError::ReadDir {
        path: path.to_path_buf(),
        source,
    };

    fs::read_dir(path)
        .map_err(read_err)?
        .map(|entry| entry.map(|e| e.path()).map_err(read_err))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn site_dir(root: &Path, client: &str, web: &str) -> PathBuf {
        let path = root.join(client).join(web);
        fs::create_dir_all(&path).unwrap();
        path
    }

    fn with_ssl(site: &Path, files: &[&str]) {
        let ssl = site.join(SSL_DIR);
        fs::create_dir_all(&ssl).unwrap();
        for file in files {
            fs::write(ssl.join(file), "cert").unwrap();
        }
    }

    #[test]
    fn test_domain_from_cert() {
        assert_eq!(domain_from_cert("example.org-le.crt"), Some("example.org"));
        assert_eq!(domain_from_cert("shop.example.org-le.crt"), Some("shop.example.org"));
        assert_eq!(domain_from_cert("-le.crt"), None);
        assert_eq!(domain_from_cert("example.org.crt"), None);
        assert_eq!(domain_from_cert("example.org-le.key"), None);
    }

    #[test]
    fn test_resolves_domain_from_certificate() {
        let root = TempDir::new().unwrap();
        let site = site_dir(root.path(), "client1", "web1");
        with_ssl(&site, &["example.org-le.key", "example.org-le.crt"]);

        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        assert_eq!(sites.len(), 1);
        assert_eq!(sites.get("example.org"), Some(site.as_path()));
    }

    #[test]
    fn test_missing_or_empty_ssl_is_unknown() {
        let root = TempDir::new().unwrap();
        let site = site_dir(root.path(), "client1", "web1");

        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        assert_eq!(sites.get(UNKNOWN_SITE), Some(site.as_path()));

        with_ssl(&site, &[]);
        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        assert_eq!(sites.get(UNKNOWN_SITE), Some(site.as_path()));

        with_ssl(&site, &["-le.crt", "README"]);
        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        assert!(sites.iter().all(Site::is_unknown));
    }

    #[test]
    fn test_unknown_sites_collapse_to_one_entry() {
        let root = TempDir::new().unwrap();
        let first = site_dir(root.path(), "client1", "web1");
        let second = site_dir(root.path(), "client2", "web2");
        with_ssl(&first, &[]);
        with_ssl(&second, &[]);

        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        assert_eq!(sites.len(), 1);
        let unknown = sites.get(UNKNOWN_SITE).unwrap();
        assert!(unknown == first || unknown == second);
    }

    #[test]
    fn test_skips_non_site_entries() {
        let root = TempDir::new().unwrap();
        fs::write(root.path().join("stray-file"), "x").unwrap();
        site_dir(root.path(), "client1", "private");
        site_dir(root.path(), "client1", "log");
        fs::write(root.path().join("client1").join("web-notes.txt"), "x").unwrap();
        let site = site_dir(root.path(), "client1", "web7");
        with_ssl(&site, &["shop.test-le.crt"]);

        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        let names: Vec<&str> = sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["shop.test"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_names_are_discovered() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let root = TempDir::new().unwrap();
        let client = root.path().join("client1");
        let named = client.join(OsStr::from_bytes(b"web\xff1"));
        let latin1 = client.join(OsStr::from_bytes(b"web\xe92"));
        fs::create_dir_all(&named).unwrap();
        fs::create_dir_all(&latin1).unwrap();
        with_ssl(&named, &["example.org-le.crt"]);
        fs::create_dir_all(latin1.join(SSL_DIR)).unwrap();
        fs::write(latin1.join(SSL_DIR).join(OsStr::from_bytes(b"caf\xe9.test-le.crt")), "cert").unwrap();

        let sites = SiteDiscovery::new(root.path()).discover().unwrap();
        assert_eq!(sites.len(), 2);
        assert_eq!(sites.get("example.org"), Some(named.as_path()));
        assert_eq!(sites.get("caf\u{FFFD}.test"), Some(latin1.as_path()));
    }

    #[test]
    fn test_missing_root_is_an_error() {
        let root = TempDir::new().unwrap();
        let missing = root.path().join("nope");

        let err = SiteDiscovery::new(&missing).discover().unwrap_err();
        let DiscoveryError::ReadDir { path, .. } = err;
        assert_eq!(path, missing);
    }

    #[test]
    fn test_site_map_replaces_in_place() {
        let mut sites = SiteMap::new();
        sites.insert(Site { name: "a".into(), path: "/a".into() });
        sites.insert(Site { name: UNKNOWN_SITE.into(), path: "/u1".into() });
        sites.insert(Site { name: "b".into(), path: "/b".into() });

        let displaced = sites.insert(Site { name: UNKNOWN_SITE.into(), path: "/u2".into() });
        assert_eq!(displaced, Some(PathBuf::from("/u1")));

        let order: Vec<&str> = sites.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(order, vec!["a", UNKNOWN_SITE, "b"]);
        assert_eq!(sites.get(UNKNOWN_SITE), Some(Path::new("/u2")));
    }
}
