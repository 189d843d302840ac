//! Contact messages
//!
//! Visitors submit the contact form; admins read, flag and delete messages.

use crate::db::repositories::ContactRepository;
use crate::models::{Contact, ContactInput, ListParams, PagedResult, ReadFilter};
use crate::services::validation_message;
use std::collections::BTreeSet;
use std::sync::Arc;
use validator::Validate;

#[derive(Debug, thiserror::Error)]
pub enum ContactServiceError {
    #[error("Message not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct ContactService {
    repo: Arc<dyn ContactRepository>,
}

impl ContactService {
    pub fn new(repo: Arc<dyn ContactRepository>) -> Self {
        Self { repo }
    }

    /// Store a contact form submission
    pub async fn submit(&self, input: ContactInput) -> Result<Contact, ContactServiceError> {
        let input = ContactInput {
            name: input.name.trim().to_string(),
            email: input.email.trim().to_string(),
            subject: input.subject.trim().to_string(),
            message: input.message.trim().to_string(),
        };
        input
            .validate()
            .map_err(|e| ContactServiceError::ValidationError(validation_message(&e)))?;

        let contact = self.repo.create(&input).await?;
        tracing::info!(contact_id = contact.id, "Contact message received");
        Ok(contact)
    }

    pub async fn get(&self, id: i64) -> Result<Contact, ContactServiceError> {
        self.repo
            .get_by_id(id)
            .await?
            .ok_or(ContactServiceError::NotFound(id))
    }

    pub async fn list(
        &self,
        filter: ReadFilter,
        params: &ListParams,
    ) -> Result<PagedResult<Contact>, ContactServiceError> {
        let (items, total) = self.repo.list(filter, params).await?;
        Ok(PagedResult::new(items, total, params))
    }

    /// Flag the listed messages read or unread
    pub async fn mark_read(&self, ids: &[i64], is_read: bool) -> Result<u64, ContactServiceError> {
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        Ok(self.repo.mark_read(&ids, is_read).await?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ContactServiceError> {
        if !self.repo.delete(id).await? {
            return Err(ContactServiceError::NotFound(id));
        }
        Ok(())
    }

    pub async fn bulk_delete(&self, ids: &[i64]) -> Result<u64, ContactServiceError> {
        let ids = dedupe(ids);
        if ids.is_empty() {
            return Ok(0);
        }
        let deleted = self.repo.bulk_delete(&ids).await?;
        tracing::info!(deleted, "Contact messages bulk deleted");
        Ok(deleted)
    }

    pub async fn unread_count(&self) -> Result<i64, ContactServiceError> {
        Ok(self.repo.unread_count().await?)
    }
}

fn dedupe(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrated_test_pool;
    use crate::db::repositories::SqlxContactRepository;

    async fn service() -> ContactService {
        ContactService::new(SqlxContactRepository::boxed(migrated_test_pool().await))
    }

    fn message(subject: &str) -> ContactInput {
        ContactInput {
            name: " Ada ".into(),
            email: "ada@example.com ".into(),
            subject: subject.into(),
            message: "Hello there, I have a question.".into(),
        }
    }

    #[tokio::test]
    async fn test_submit_trims_and_validates() {
        let service = service().await;
        let contact = service.submit(message("Question")).await.unwrap();
        assert_eq!(contact.name, "Ada");
        assert_eq!(contact.email, "ada@example.com");
        assert!(!contact.is_read);

        let mut short = message("Short");
        short.message = "   too short   ".into();
        assert!(matches!(
            service.submit(short).await,
            Err(ContactServiceError::ValidationError(_))
        ));

        let mut blank_name = message("Nameless");
        blank_name.name = "   ".into();
        assert!(service.submit(blank_name).await.is_err());
    }

    #[tokio::test]
    async fn test_admin_workflow() {
        let service = service().await;
        let a = service.submit(message("A")).await.unwrap();
        let b = service.submit(message("B")).await.unwrap();
        let c = service.submit(message("C")).await.unwrap();
        assert_eq!(service.unread_count().await.unwrap(), 3);

        assert_eq!(service.mark_read(&[a.id, b.id, a.id], true).await.unwrap(), 2);
        assert_eq!(service.unread_count().await.unwrap(), 1);

        let unread = service
            .list(ReadFilter::Unread, &ListParams::default())
            .await
            .unwrap();
        assert_eq!(unread.items.len(), 1);
        assert_eq!(unread.items[0].id, c.id);

        service.delete(c.id).await.unwrap();
        assert!(matches!(service.get(c.id).await, Err(ContactServiceError::NotFound(_))));
        assert_eq!(service.bulk_delete(&[a.id, b.id, 77]).await.unwrap(), 2);
        assert_eq!(service.list(ReadFilter::All, &ListParams::default()).await.unwrap().total, 0);
    }
}
