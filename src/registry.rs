use std::{fs, io, path::PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;
use crate::types::EmergencyContact;

#[derive(Debug, Default, Serialize, Deserialize)]
struct EmailsFile {
    #[serde(default)]
    emails: Vec<String>,
}

/// Ordered collection of emergency contacts backed by a flat JSON file
/// (`{ "emails": [...] }`). Only the email strings are persisted; ids, names
/// and active flags live in memory for the lifetime of the process.
pub struct EmergencyRegistry {
    path: PathBuf,
    contacts: Vec<EmergencyContact>,
}

fn new_contact(name: &str, email: &str) -> EmergencyContact {
    EmergencyContact {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        email: email.to_string(),
        active: true,
        created_at: Utc::now().to_rfc3339(),
    }
}

impl EmergencyRegistry {
    pub fn open(path: PathBuf) -> Self {
        let mut registry = Self {
            path,
            contacts: Vec::new(),
        };
        if !registry.path.exists() {
            registry.save();
        }
        registry.reload();
        registry
    }

    /// Re-reads the persisted file and reconstructs the in-memory collection
    /// from it. Contacts already known by email keep their id/name/active;
    /// emails only present in the file materialize as fresh active contacts.
    pub fn reload(&mut self) {
        let emails = match self.read_file() {
            Ok(emails) => emails,
            Err(err) if err.kind() == io::ErrorKind::NotFound => Vec::new(),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "emergency emails file unreadable, keeping in-memory list");
                return;
            }
        };

        let previous = std::mem::take(&mut self.contacts);
        self.contacts = emails
            .iter()
            .map(|email| {
                previous
                    .iter()
                    .find(|c| &c.email == email)
                    .cloned()
                    .unwrap_or_else(|| new_contact(email, email))
            })
            .collect();
    }

    fn read_file(&self) -> io::Result<Vec<String>> {
        let raw = fs::read_to_string(&self.path)?;
        match serde_json::from_str::<EmailsFile>(&raw) {
            Ok(doc) => Ok(doc.emails),
            Err(err) => {
                tracing::warn!(path = %self.path.display(), %err, "malformed emergency emails file, treating as empty");
                Ok(Vec::new())
            }
        }
    }

    /// Best-effort write; failures are logged and swallowed so admin
    /// operations still succeed against the in-memory list.
    fn save(&self) {
        let doc = EmailsFile {
            emails: self.contacts.iter().map(|c| c.email.clone()).collect(),
        };
        let result = (|| -> io::Result<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let raw = serde_json::to_string_pretty(&doc).unwrap_or_else(|_| "{}".to_string());
            fs::write(&self.path, raw)
        })();

        if let Err(err) = result {
            tracing::warn!(path = %self.path.display(), %err, "failed to persist emergency emails");
        }
    }

    pub fn list(&mut self) -> Vec<EmergencyContact> {
        self.reload();
        self.contacts.clone()
    }

    pub fn active_emails(&mut self) -> Vec<String> {
        self.list()
            .into_iter()
            .filter(|c| c.active)
            .map(|c| c.email)
            .collect()
    }

    pub fn add(&mut self, name: Option<&str>, email: &str) -> Result<EmergencyContact, ApiError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ApiError::validation("email is required"));
        }
        let name = match name.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => email,
        };

        let contact = new_contact(name, email);
        self.contacts.push(contact.clone());
        self.save();
        Ok(contact)
    }

    pub fn remove(&mut self, id: &str) -> Result<(), ApiError> {
        let index = self
            .contacts
            .iter()
            .position(|c| c.id == id)
            .ok_or_else(|| ApiError::not_found(format!("no emergency email with id {id}")))?;
        self.contacts.remove(index);
        self.save();
        Ok(())
    }

    pub fn contacts(&self) -> &[EmergencyContact] {
        &self.contacts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn registry_in(dir: &tempfile::TempDir) -> EmergencyRegistry {
        EmergencyRegistry::open(dir.path().join("emergency-emails.json"))
    }

    #[test]
    fn open_creates_file_and_starts_empty() {
        let dir = tempdir().unwrap();
        let registry = registry_in(&dir);
        assert!(dir.path().join("emergency-emails.json").exists());
        assert!(registry.contacts().is_empty());
    }

    #[test]
    fn add_assigns_id_and_defaults() {
        let dir = tempdir().unwrap();
        let mut registry = registry_in(&dir);

        let contact = registry.add(None, "  ops@x.com ").unwrap();
        assert!(!contact.id.is_empty());
        assert_eq!(contact.email, "ops@x.com");
        assert_eq!(contact.name, "ops@x.com");
        assert!(contact.active);

        let listed = registry.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, contact.id);
    }

    #[test]
    fn add_rejects_blank_email() {
        let dir = tempdir().unwrap();
        let mut registry = registry_in(&dir);
        assert!(matches!(
            registry.add(Some("Ops"), "   "),
            Err(ApiError::Validation(_))
        ));
    }

    #[test]
    fn remove_twice_fails_second_time() {
        let dir = tempdir().unwrap();
        let mut registry = registry_in(&dir);
        let contact = registry.add(Some("Ops"), "ops@x.com").unwrap();

        registry.remove(&contact.id).unwrap();
        assert!(matches!(
            registry.remove(&contact.id),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn remove_unknown_id_is_not_found() {
        let dir = tempdir().unwrap();
        let mut registry = registry_in(&dir);
        assert!(matches!(
            registry.remove("missing"),
            Err(ApiError::NotFound(_))
        ));
    }

    #[test]
    fn list_survives_process_restart_via_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emergency-emails.json");
        {
            let mut registry = EmergencyRegistry::open(path.clone());
            registry.add(Some("Plantão"), "plantao@x.com").unwrap();
        }

        let mut reopened = EmergencyRegistry::open(path);
        let listed = reopened.list();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].email, "plantao@x.com");
        // only the email string is persisted, so the name resets to it
        assert_eq!(listed[0].name, "plantao@x.com");
        assert!(listed[0].active);
    }

    #[test]
    fn list_reconstructs_from_external_file_edits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emergency-emails.json");
        let mut registry = EmergencyRegistry::open(path.clone());
        let kept = registry.add(Some("Kept"), "kept@x.com").unwrap();

        fs::write(&path, r#"{"emails":["kept@x.com","added@x.com"]}"#).unwrap();

        let listed = registry.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].id, kept.id);
        assert_eq!(listed[0].name, "Kept");
        assert_eq!(listed[1].email, "added@x.com");
        assert!(listed[1].active);
    }

    #[test]
    fn malformed_file_reads_as_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("emergency-emails.json");
        fs::write(&path, "not json at all").unwrap();

        let mut registry = EmergencyRegistry::open(path);
        assert!(registry.list().is_empty());
    }
}
