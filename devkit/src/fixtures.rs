/*!
Arborescences ISPConfig jetables pour les tests

Construit `<root>/<client>/webN/ssl/<domain>-le.crt` dans un répertoire temporaire:
- Sites avec ou sans certificat Let's Encrypt
- Répertoire `ssl` absent, vide ou peuplé
- Fichiers de contenu de taille connue pour les mesures `du`
*/

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Racine temporaire d'un serveur d'hébergement, supprimée au drop
pub struct SiteTree {
    dir: TempDir,
}

impl SiteTree {
    pub fn new() -> io::Result<Self> {
        Ok(Self { dir: TempDir::new()? })
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    /// Prépare un site `<client>/<web>`; rien n'est écrit avant `create()`
    pub fn site(&self, client: &str, web: &str) -> SiteBuilder<'_> {
        SiteBuilder {
            tree: self,
            client: client.to_string(),
            web: web.to_string(),
            ssl_files: None,
            payload: Vec::new(),
        }
    }

    pub fn site_path(&self, client: &str, web: &str) -> PathBuf {
        self.root().join(client).join(web)
    }

    pub fn remove_site(&self, client: &str, web: &str) -> io::Result<()> {
        fs::remove_dir_all(self.site_path(client, web))
    }
}

pub struct SiteBuilder<'a> {
    tree: &'a SiteTree,
    client: String,
    web: String,
    /// None = pas de répertoire ssl
    ssl_files: Option<Vec<String>>,
    payload: Vec<(String, usize)>,
}

impl SiteBuilder<'_> {
    /// Ajoute `<domain>-le.crt` (et la clé associée) dans `ssl/`
    pub fn cert(self, domain: &str) -> Self {
        self.ssl_file(&format!("{domain}-le.key"))
            .ssl_file(&format!("{domain}-le.crt"))
    }

    pub fn ssl_file(mut self, name: &str) -> Self {
        self.ssl_files.get_or_insert_with(Vec::new).push(name.to_string());
        self
    }

    /// Crée `ssl/` sans aucun fichier
    pub fn empty_ssl(mut self) -> Self {
        self.ssl_files.get_or_insert_with(Vec::new);
        self
    }

    /// Fichier de `size` octets dans `web/`
    pub fn payload(mut self, name: &str, size: usize) -> Self {
        self.payload.push((name.to_string(), size));
        self
    }

    pub fn create(self) -> io::Result<PathBuf> {
        let site = self.tree.site_path(&self.client, &self.web);
        fs::create_dir_all(&site)?;

        if let Some(files) = &self.ssl_files {
            let ssl = site.join("ssl");
            fs::create_dir_all(&ssl)?;
            for file in files {
                fs::write(ssl.join(file), "-----BEGIN CERTIFICATE-----\n")?;
            }
        }

        if !self.payload.is_empty() {
            let web = site.join("web");
            fs::create_dir_all(&web)?;
            for (name, size) in &self.payload {
                fs::write(web.join(name), vec![b'x'; *size])?;
            }
        }

        log::debug!("🏗️ Fixture site created: {}", site.display());
        Ok(site)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_site_layout() {
        let tree = SiteTree::new().unwrap();
        let site = tree
            .site("client1", "web1")
            .cert("example.org")
            .payload("index.html", 100)
            .create()
            .unwrap();

        assert_eq!(site, tree.root().join("client1/web1"));
        assert!(site.join("ssl/example.org-le.crt").is_file());
        assert!(site.join("ssl/example.org-le.key").is_file());
        assert_eq!(fs::metadata(site.join("web/index.html")).unwrap().len(), 100);
    }

    #[test]
    fn test_ssl_variants() {
        let tree = SiteTree::new().unwrap();
        let bare = tree.site("client1", "web1").create().unwrap();
        let empty = tree.site("client1", "web2").empty_ssl().create().unwrap();

        assert!(!bare.join("ssl").exists());
        assert!(empty.join("ssl").is_dir());
        assert_eq!(fs::read_dir(empty.join("ssl")).unwrap().count(), 0);

        tree.remove_site("client1", "web1").unwrap();
        assert!(!bare.exists());
    }
}
