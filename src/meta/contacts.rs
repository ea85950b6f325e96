//! Correspondents, keyed by lower-cased email, with the time last seen.

use tracing::trace;

use super::{keys, MetaIndex};
use crate::error::{ArchiveError, Result};
use crate::index::InvertedIndex;
use crate::model::person::Person;
use crate::model::record::Contact;
use crate::store::{KvStore, TypedStore};

impl<S: KvStore, I: InvertedIndex> MetaIndex<S, I> {
    /// Record that `person` was seen at `timestamp` (Unix seconds).
    ///
    /// Older sightings never overwrite newer ones. Returns `true` only when
    /// the contact was not known before.
    pub fn touch_contact(&mut self, person: &Person, timestamp: i64) -> Result<bool> {
        let key = keys::contact(&person.email);
        let old: Option<Contact> = self.store.load(&key)?;
        if old.as_ref().is_some_and(|c| c.timestamp >= timestamp) {
            return Ok(false);
        }

        let contact = Contact {
            name: person.name.clone(),
            email: person.email.clone(),
            timestamp,
        };
        self.store.save(&key, &contact)?;
        if let Some(name) = &person.name {
            self.store.save(&keys::contact_by_name(name), &contact)?;
        }
        trace!(email = %person.email, timestamp, "Touched contact");
        Ok(old.is_none())
    }

    /// Contacts whose email starts with `prefix`, in email order.
    pub fn list_contacts(&self, prefix: Option<&str>, limit: usize) -> Result<Vec<Contact>> {
        let rows = match prefix {
            Some(p) => {
                let p = p.to_lowercase().replace('/', "");
                let from = format!("{}{p}", keys::CONTACT_PREFIX);
                // '~' sorts after every character an address uses.
                let to = format!("{from}~");
                self.store.scan(&from, Some(&to), limit)?
            }
            // '0' is the byte after '/', so this covers every `c/` key.
            None => self.store.scan(keys::CONTACT_PREFIX, Some("c0"), limit)?,
        };
        rows.into_iter()
            .map(|(key, bytes)| bincode::deserialize(&bytes).map_err(|e| ArchiveError::codec(&key, e)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::*;
    use super::*;

    #[test]
    fn test_touch_reports_new_contacts_only() {
        let mut meta = open();
        let p = Person::parse("Egg Zample <Egg@Example.com>");
        assert!(meta.touch_contact(&p, 100).unwrap());
        assert!(!meta.touch_contact(&p, 200).unwrap());
        assert!(!meta.touch_contact(&p, 50).unwrap());

        let got = meta.list_contacts(Some("egg"), 10).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].timestamp, 200);
        assert_eq!(got[0].email, "Egg@Example.com");
    }

    #[test]
    fn test_contact_indexed_by_name_too() {
        let mut meta = open();
        meta.touch_contact(&Person::parse("Egg Zample <egg@example.com>"), 1)
            .unwrap();
        let by_name: Option<Contact> = meta.store().load(&keys::contact_by_name("EGG ZAMPLE")).unwrap();
        assert_eq!(by_name.map(|c| c.email).as_deref(), Some("egg@example.com"));
        // Name entries do not show up in email listings.
        assert_eq!(meta.list_contacts(None, 10).unwrap().len(), 1);
    }

    #[test]
    fn test_prefix_listing_is_ordered_and_bounded() {
        let mut meta = open();
        for email in ["bob@b.org", "alice@a.org", "alan@a.org", "carol@c.org"] {
            meta.touch_contact(&Person::parse(email), 1).unwrap();
        }
        let emails = |cs: Vec<Contact>| cs.into_iter().map(|c| c.email).collect::<Vec<_>>();
        assert_eq!(
            emails(meta.list_contacts(Some("AL"), 10).unwrap()),
            vec!["alan@a.org", "alice@a.org"]
        );
        assert_eq!(
            emails(meta.list_contacts(None, 2).unwrap()),
            vec!["alan@a.org", "alice@a.org"]
        );
        assert!(meta.list_contacts(Some("zed"), 10).unwrap().is_empty());
        assert_eq!(meta.list_contacts(Some("a/l"), 10).unwrap().len(), 2);
    }

    #[test]
    fn test_full_listing_includes_non_ascii_addresses() {
        let mut meta = open();
        meta.touch_contact(&Person::parse("zoe@example.org"), 1).unwrap();
        meta.touch_contact(&Person::parse("élodie@example.fr"), 1).unwrap();
        meta.touch_contact(&Person::parse("José <jose@example.es>"), 1).unwrap();
        let emails: Vec<String> = meta
            .list_contacts(None, 10)
            .unwrap()
            .into_iter()
            .map(|c| c.email)
            .collect();
        assert_eq!(emails, vec!["jose@example.es", "zoe@example.org", "élodie@example.fr"]);
    }
}
