//! Basic walkthrough: declare record types, register them, run CRUD and
//! analytics. Uses the in-memory backend so it runs without a server; swap
//! the connector for `MongoConnector` (with the `mongodb` feature) and a
//! `RegistryConfig::from_env()` to run against a real deployment.

use bson::doc;
use modelbind::{memory::MemoryConnector, prelude::*};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct User {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    name: String,
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    age: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<bson::DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<bson::DateTime>,
}

impl Model for User {
    type Id = i64;

    fn type_name() -> &'static str {
        "User"
    }

    fn schema() -> ModelSchema {
        ModelSchema::new()
            .field(FieldSpec::required("name", FieldKind::String).non_empty())
            .field(FieldSpec::required("email", FieldKind::String).non_empty())
            .field(FieldSpec::optional("age", FieldKind::Int))
    }

    fn indexes() -> Vec<IndexSpec> {
        vec![IndexSpec::single("email", true)]
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn created_at(&self) -> Option<bson::DateTime> {
        self.created_at
    }
    fn set_created_at(&mut self, at: bson::DateTime) {
        self.created_at = Some(at);
    }
    fn updated_at(&self) -> Option<bson::DateTime> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: bson::DateTime) {
        self.updated_at = Some(at);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BlogPost {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    title: String,
    author_id: i64,
    published: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<bson::DateTime>,
    #[serde(skip_serializing_if = "Option::is_none")]
    updated_at: Option<bson::DateTime>,
}

impl Model for BlogPost {
    type Id = i64;

    fn type_name() -> &'static str {
        "BlogPost"
    }

    fn id(&self) -> Option<i64> {
        self.id
    }
    fn set_id(&mut self, id: i64) {
        self.id = Some(id);
    }
    fn created_at(&self) -> Option<bson::DateTime> {
        self.created_at
    }
    fn set_created_at(&mut self, at: bson::DateTime) {
        self.created_at = Some(at);
    }
    fn updated_at(&self) -> Option<bson::DateTime> {
        self.updated_at
    }
    fn set_updated_at(&mut self, at: bson::DateTime) {
        self.updated_at = Some(at);
    }
}

#[tokio::main]
async fn main() -> ModelResult<()> {
    let registry = ModelRegistry::new(
        MemoryConnector::new(),
        RegistryConfig::new("memory://local", "example_db"),
    );

    // Register everything up front; names derive automatically:
    // User -> user, BlogPost -> blog_post.
    let scope = ModelScope::new().with::<User>().with::<BlogPost>();
    for (name, outcome) in registry.register_all(&scope).await {
        match outcome {
            Ok(binding) => println!("{name} -> collection '{}'", binding.collection),
            Err(err) => eprintln!("{name} failed to register: {err}"),
        }
    }

    let users = registry.collection::<User>().await?;
    let posts = registry.collection::<BlogPost>().await?;

    let user = users
        .create(User {
            id: None,
            name: "John Smith".to_string(),
            email: "john@example.com".to_string(),
            age: Some(25),
            created_at: None,
            updated_at: None,
        })
        .await?;
    println!("created user {:?} at {:?}", user.id, user.created_at);

    let mut user = users.get_by_id(user.id.unwrap_or_default()).await?.unwrap_or(user);
    user.age = Some(26);
    users.save(&mut user).await?;
    println!("updated user, modified at {:?}", user.updated_at);

    posts
        .bulk_create(vec![
            BlogPost {
                id: None,
                title: "Getting started".to_string(),
                author_id: user.id.unwrap_or_default(),
                published: true,
                created_at: None,
                updated_at: None,
            },
            BlogPost {
                id: None,
                title: "Drafts stay hidden".to_string(),
                author_id: user.id.unwrap_or_default(),
                published: false,
                created_at: None,
                updated_at: None,
            },
        ])
        .await?;

    let published = posts.filter(doc! { "published": true }).await?;
    println!("published posts: {}", published.len());
    println!("total posts: {}", posts.count(None).await?);

    let removed = posts.delete_many(None).await?;
    println!("cleaned up {removed} posts");

    registry.close_all_connections().await
}
