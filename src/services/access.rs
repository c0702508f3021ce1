//! Who may see and change a document.
//!
//! Both the per-document checks and the list filter are derived from the
//! same relation table, so a document shows up in a user's list exactly when
//! the detail endpoint would let them open it.

use bson::doc;
use bson::oid::ObjectId;

use crate::auth::models::{AuthenticatedUser, Role};
use crate::db::models::Document;
use crate::error::AppError;

/// How a user can be tied to a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relation {
    Author,
    Stakeholder,
    Owner,
}

impl Relation {
    /// Relations that grant read access.
    pub const READ: [Relation; 3] = [Relation::Author, Relation::Stakeholder, Relation::Owner];

    /// The document field holding this relation.
    pub fn field(&self) -> &'static str {
        match self {
            Relation::Author => "author",
            Relation::Stakeholder => "stakeholders",
            Relation::Owner => "owners",
        }
    }

    pub fn holds(&self, doc: &Document, user: ObjectId) -> bool {
        match self {
            Relation::Author => doc.author == user,
            Relation::Stakeholder => doc.stakeholders.contains(&user),
            Relation::Owner => doc.owners.contains(&user),
        }
    }
}

fn related(doc: &Document, user: &AuthenticatedUser, relations: &[Relation]) -> bool {
    relations.iter().any(|r| r.holds(doc, user.user_id))
}

pub fn can_read(doc: &Document, user: &AuthenticatedUser) -> bool {
    user.is_admin() || related(doc, user, &Relation::READ)
}

/// Editors may change what they author or own; admins change anything.
pub fn can_modify(doc: &Document, user: &AuthenticatedUser) -> bool {
    user.role.has_role(Role::Editor)
        && (user.is_admin() || related(doc, user, &[Relation::Author, Relation::Owner]))
}

pub fn can_delete(doc: &Document, user: &AuthenticatedUser) -> bool {
    user.is_admin() || Relation::Author.holds(doc, user.user_id)
}

/// Restriction to add to document queries, `None` when the user sees everything.
pub fn access_filter(user: &AuthenticatedUser) -> Option<bson::Document> {
    if user.is_admin() {
        return None;
    }

    let clauses: Vec<bson::Document> = Relation::READ
        .iter()
        .map(|r| doc! { r.field(): user.user_id })
        .collect();
    Some(doc! { "$or": clauses })
}

pub fn ensure_read(doc: &Document, user: &AuthenticatedUser) -> Result<(), AppError> {
    ensure(can_read(doc, user), user, "view this document")
}

pub fn ensure_modify(doc: &Document, user: &AuthenticatedUser) -> Result<(), AppError> {
    ensure(can_modify(doc, user), user, "modify this document")
}

pub fn ensure_delete(doc: &Document, user: &AuthenticatedUser) -> Result<(), AppError> {
    ensure(can_delete(doc, user), user, "delete this document")
}

fn ensure(allowed: bool, user: &AuthenticatedUser, action: &str) -> Result<(), AppError> {
    if allowed {
        Ok(())
    } else {
        tracing::warn!(user = %user.user_id, role = %user.role, "Denied: {action}");
        Err(AppError::Authorization(format!("You may not {action}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::DateTime as BsonDateTime;

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: ObjectId::new(),
            email: "u@example.com".to_string(),
            role,
            token_id: "t".to_string(),
        }
    }

    fn document_by(author: ObjectId) -> Document {
        let now = BsonDateTime::now();
        Document {
            id: Some(ObjectId::new()),
            title: "Policy".to_string(),
            description: String::new(),
            author,
            category: None,
            team: None,
            project: None,
            stakeholders: vec![],
            owners: vec![],
            external_contacts: vec![],
            opens_for_review: None,
            review_date: None,
            review_interval: None,
            review_completed: false,
            review_completed_by: None,
            review_completed_at: None,
            current_version: 0,
            current_file: None,
            version_history: vec![],
            created_by: author,
            updated_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_admins_read_everything() {
        let doc = document_by(ObjectId::new());
        assert!(can_read(&doc, &user(Role::Admin)));
        assert!(can_read(&doc, &user(Role::Superadmin)));
        assert!(!can_read(&doc, &user(Role::Viewer)));
    }

    #[test]
    fn test_relations_grant_read() {
        let stakeholder = user(Role::Viewer);
        let owner = user(Role::Viewer);
        let mut doc = document_by(ObjectId::new());
        doc.stakeholders.push(stakeholder.user_id);
        doc.owners.push(owner.user_id);

        assert!(can_read(&doc, &stakeholder));
        assert!(can_read(&doc, &owner));
    }

    #[test]
    fn test_modify_rules() {
        let author = user(Role::Editor);
        let stakeholder = user(Role::Editor);
        let viewer_owner = user(Role::Viewer);
        let mut doc = document_by(author.user_id);
        doc.stakeholders.push(stakeholder.user_id);
        doc.owners.push(viewer_owner.user_id);

        assert!(can_modify(&doc, &author));
        assert!(!can_modify(&doc, &stakeholder));
        assert!(!can_modify(&doc, &viewer_owner), "viewers never modify");
        assert!(can_modify(&doc, &user(Role::Admin)));
    }

    #[test]
    fn test_delete_rules() {
        let author = user(Role::Editor);
        let owner = user(Role::Editor);
        let mut doc = document_by(author.user_id);
        doc.owners.push(owner.user_id);

        assert!(can_delete(&doc, &author));
        assert!(!can_delete(&doc, &owner));
        assert!(can_delete(&doc, &user(Role::Admin)));
    }

    #[test]
    fn test_filter_agrees_with_can_read() {
        let me = user(Role::Viewer);
        let filter = access_filter(&me).unwrap();
        let clauses = filter.get_array("$or").unwrap();
        assert_eq!(clauses.len(), Relation::READ.len());

        for (clause, relation) in clauses.iter().zip(Relation::READ) {
            let clause = clause.as_document().unwrap();
            assert_eq!(clause.get_object_id(relation.field()).unwrap(), me.user_id);
        }

        assert!(access_filter(&user(Role::Admin)).is_none());
    }

    #[test]
    fn test_ensure_maps_to_authorization_error() {
        let doc = document_by(ObjectId::new());
        let err = ensure_read(&doc, &user(Role::Viewer)).unwrap_err();
        assert!(matches!(err, AppError::Authorization(_)));
    }
}
