//! Public site content: blog posts and reviews, books, testimonials, FAQs,
//! tags and categories. Plain CRUD records with no lifecycle.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{non_empty, set_if_some};
use crate::db::store::{Entity, FieldValue, Fields, NewRecord, PatchRecord, SortOrder};
use crate::error::{CoreError, CoreResult};
use crate::validation::{check, require, validate_email, validate_rating, validate_slug, validate_url};

fn tags_json(tags: &[String]) -> CoreResult<FieldValue> {
    serde_json::to_string(tags)
        .map(FieldValue::from)
        .map_err(|e| CoreError::validation("tags", e.to_string()))
}

// -------------------------------------------------------------------------
// Blog posts
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Blog {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub excerpt: Option<String>,
    pub content: String,
    pub author: String,
    pub category: Option<String>,
    #[sqlx(json)]
    pub tags: Vec<String>,
    pub cover_image: Option<String>,
    pub is_published: bool,
    pub view_count: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Blog {
    const TABLE: &'static str = "blogs";
    const KIND: &'static str = "Blog";
    const UNIQUE_KEY: Option<&'static str> = Some("slug");
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "excerpt", "content", "author"];
    const SORT_COLUMNS: &'static [&'static str] =
        &["created_at", "updated_at", "title", "view_count"];
    const PUBLISH_FLAG: Option<&'static str> = Some("is_published");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlog {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    pub excerpt: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub author: String,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub cover_image: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

impl NewRecord for NewBlog {
    type Entity = Blog;

    fn validate(&self) -> CoreResult<()> {
        check("slug", validate_slug(&self.slug))?;
        require("title", &self.title)?;
        require("content", &self.content)?;
        require("author", &self.author)?;
        check("coverImage", validate_url(&self.cover_image))
    }

    fn unique_value(&self) -> Option<String> {
        Some(self.slug.clone())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("slug", FieldValue::from(self.slug)),
            ("title", FieldValue::from(self.title.trim())),
            ("excerpt", FieldValue::from(non_empty(self.excerpt))),
            ("content", FieldValue::from(self.content)),
            ("author", FieldValue::from(self.author.trim())),
            ("category", FieldValue::from(non_empty(self.category))),
            ("tags", tags_json(&self.tags)?),
            ("cover_image", FieldValue::from(non_empty(self.cover_image))),
            ("is_published", FieldValue::from(self.is_published)),
            ("view_count", FieldValue::from(0i64)),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPatch {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub excerpt: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub cover_image: Option<String>,
    pub is_published: Option<bool>,
}

impl PatchRecord for BlogPatch {
    type Entity = Blog;

    fn validate(&self) -> CoreResult<()> {
        if let Some(slug) = &self.slug {
            check("slug", validate_slug(slug))?;
        }
        if let Some(title) = &self.title {
            require("title", title)?;
        }
        check("coverImage", validate_url(&self.cover_image))
    }

    fn unique_value(&self) -> Option<String> {
        self.slug.clone()
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "slug", self.slug);
        set_if_some(&mut fields, "title", self.title);
        set_if_some(&mut fields, "excerpt", self.excerpt);
        set_if_some(&mut fields, "content", self.content);
        set_if_some(&mut fields, "author", self.author);
        set_if_some(&mut fields, "category", self.category);
        if let Some(tags) = self.tags {
            fields.push(("tags", tags_json(&tags)?));
        }
        set_if_some(&mut fields, "cover_image", self.cover_image);
        set_if_some(&mut fields, "is_published", self.is_published);
        Ok(fields)
    }
}

// -------------------------------------------------------------------------
// Blog reviews
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct BlogReview {
    pub id: String,
    pub blog_id: String,
    pub name: String,
    #[serde(skip_serializing)]
    pub email: String,
    pub rating: i64,
    pub comment: String,
    pub is_approved: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for BlogReview {
    const TABLE: &'static str = "blog_reviews";
    const KIND: &'static str = "Review";
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "comment"];
    const SORT_COLUMNS: &'static [&'static str] = &["created_at", "updated_at", "rating"];
    const PUBLISH_FLAG: Option<&'static str> = Some("is_approved");

    fn id(&self) -> &str {
        &self.id
    }
}

/// Reader-submitted review; always starts unapproved
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBlogReview {
    #[serde(skip)]
    pub blog_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub rating: i64,
    #[serde(default)]
    pub comment: String,
}

impl NewRecord for NewBlogReview {
    type Entity = BlogReview;

    fn validate(&self) -> CoreResult<()> {
        require("blogId", &self.blog_id)?;
        require("name", &self.name)?;
        check("email", validate_email(self.email.trim()))?;
        check("rating", validate_rating(self.rating))?;
        require("comment", &self.comment)
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("blog_id", FieldValue::from(self.blog_id)),
            ("name", FieldValue::from(self.name.trim())),
            ("email", FieldValue::from(self.email.trim())),
            ("rating", FieldValue::from(self.rating)),
            ("comment", FieldValue::from(self.comment.trim())),
            ("is_approved", FieldValue::from(false)),
        ])
    }
}

/// Moderation changes made by staff
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogReviewPatch {
    pub is_approved: Option<bool>,
    pub comment: Option<String>,
}

impl PatchRecord for BlogReviewPatch {
    type Entity = BlogReview;

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "is_approved", self.is_approved);
        set_if_some(&mut fields, "comment", self.comment);
        Ok(fields)
    }
}

// -------------------------------------------------------------------------
// Books
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    pub slug: String,
    pub title: String,
    pub author: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub purchase_url: Option<String>,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Book {
    const TABLE: &'static str = "books";
    const KIND: &'static str = "Book";
    const UNIQUE_KEY: Option<&'static str> = Some("slug");
    const SEARCH_COLUMNS: &'static [&'static str] = &["title", "author", "description"];
    const SORT_COLUMNS: &'static [&'static str] = &["created_at", "updated_at", "title", "author"];
    const PUBLISH_FLAG: Option<&'static str> = Some("is_published");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    #[serde(default)]
    pub slug: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: String,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub purchase_url: Option<String>,
    #[serde(default)]
    pub is_published: bool,
}

impl NewRecord for NewBook {
    type Entity = Book;

    fn validate(&self) -> CoreResult<()> {
        check("slug", validate_slug(&self.slug))?;
        require("title", &self.title)?;
        require("author", &self.author)?;
        check("coverImage", validate_url(&self.cover_image))?;
        check("purchaseUrl", validate_url(&self.purchase_url))
    }

    fn unique_value(&self) -> Option<String> {
        Some(self.slug.clone())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("slug", FieldValue::from(self.slug)),
            ("title", FieldValue::from(self.title.trim())),
            ("author", FieldValue::from(self.author.trim())),
            ("description", FieldValue::from(non_empty(self.description))),
            ("cover_image", FieldValue::from(non_empty(self.cover_image))),
            ("purchase_url", FieldValue::from(non_empty(self.purchase_url))),
            ("is_published", FieldValue::from(self.is_published)),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BookPatch {
    pub slug: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub purchase_url: Option<String>,
    pub is_published: Option<bool>,
}

impl PatchRecord for BookPatch {
    type Entity = Book;

    fn validate(&self) -> CoreResult<()> {
        if let Some(slug) = &self.slug {
            check("slug", validate_slug(slug))?;
        }
        check("coverImage", validate_url(&self.cover_image))?;
        check("purchaseUrl", validate_url(&self.purchase_url))
    }

    fn unique_value(&self) -> Option<String> {
        self.slug.clone()
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "slug", self.slug);
        set_if_some(&mut fields, "title", self.title);
        set_if_some(&mut fields, "author", self.author);
        set_if_some(&mut fields, "description", self.description);
        set_if_some(&mut fields, "cover_image", self.cover_image);
        set_if_some(&mut fields, "purchase_url", self.purchase_url);
        set_if_some(&mut fields, "is_published", self.is_published);
        Ok(fields)
    }
}

// -------------------------------------------------------------------------
// Testimonials
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Testimonial {
    pub id: String,
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    pub quote: String,
    pub rating: i64,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Testimonial {
    const TABLE: &'static str = "testimonials";
    const KIND: &'static str = "Testimonial";
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "company", "quote"];
    const SORT_COLUMNS: &'static [&'static str] = &["created_at", "updated_at", "rating", "name"];
    const PUBLISH_FLAG: Option<&'static str> = Some("is_published");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTestimonial {
    #[serde(default)]
    pub name: String,
    pub company: Option<String>,
    pub role: Option<String>,
    #[serde(default)]
    pub quote: String,
    pub rating: Option<i64>,
    #[serde(default)]
    pub is_published: bool,
}

impl NewRecord for NewTestimonial {
    type Entity = Testimonial;

    fn validate(&self) -> CoreResult<()> {
        require("name", &self.name)?;
        require("quote", &self.quote)?;
        if let Some(rating) = self.rating {
            check("rating", validate_rating(rating))?;
        }
        Ok(())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("name", FieldValue::from(self.name.trim())),
            ("company", FieldValue::from(non_empty(self.company))),
            ("role", FieldValue::from(non_empty(self.role))),
            ("quote", FieldValue::from(self.quote.trim())),
            ("rating", FieldValue::from(self.rating.unwrap_or(5))),
            ("is_published", FieldValue::from(self.is_published)),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestimonialPatch {
    pub name: Option<String>,
    pub company: Option<String>,
    pub role: Option<String>,
    pub quote: Option<String>,
    pub rating: Option<i64>,
    pub is_published: Option<bool>,
}

impl PatchRecord for TestimonialPatch {
    type Entity = Testimonial;

    fn validate(&self) -> CoreResult<()> {
        if let Some(rating) = self.rating {
            check("rating", validate_rating(rating))?;
        }
        Ok(())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "name", self.name);
        set_if_some(&mut fields, "company", self.company);
        set_if_some(&mut fields, "role", self.role);
        set_if_some(&mut fields, "quote", self.quote);
        set_if_some(&mut fields, "rating", self.rating);
        set_if_some(&mut fields, "is_published", self.is_published);
        Ok(fields)
    }
}

// -------------------------------------------------------------------------
// FAQs
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Faq {
    pub id: String,
    pub question: String,
    pub answer: String,
    pub category: Option<String>,
    pub sort_order: i64,
    pub is_published: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Faq {
    const TABLE: &'static str = "faqs";
    const KIND: &'static str = "FAQ";
    const SEARCH_COLUMNS: &'static [&'static str] = &["question", "answer"];
    const SORT_COLUMNS: &'static [&'static str] =
        &["sort_order", "created_at", "updated_at", "category"];
    const DEFAULT_SORT: &'static str = "sort_order";
    const DEFAULT_ORDER: SortOrder = SortOrder::Asc;
    const PUBLISH_FLAG: Option<&'static str> = Some("is_published");

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFaq {
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub answer: String,
    pub category: Option<String>,
    #[serde(default)]
    pub sort_order: i64,
    pub is_published: Option<bool>,
}

impl NewRecord for NewFaq {
    type Entity = Faq;

    fn validate(&self) -> CoreResult<()> {
        require("question", &self.question)?;
        require("answer", &self.answer)
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("question", FieldValue::from(self.question.trim())),
            ("answer", FieldValue::from(self.answer.trim())),
            ("category", FieldValue::from(non_empty(self.category))),
            ("sort_order", FieldValue::from(self.sort_order)),
            ("is_published", FieldValue::from(self.is_published.unwrap_or(true))),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaqPatch {
    pub question: Option<String>,
    pub answer: Option<String>,
    pub category: Option<String>,
    pub sort_order: Option<i64>,
    pub is_published: Option<bool>,
}

impl PatchRecord for FaqPatch {
    type Entity = Faq;

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "question", self.question);
        set_if_some(&mut fields, "answer", self.answer);
        set_if_some(&mut fields, "category", self.category);
        set_if_some(&mut fields, "sort_order", self.sort_order);
        set_if_some(&mut fields, "is_published", self.is_published);
        Ok(fields)
    }
}

// -------------------------------------------------------------------------
// Tags and categories
// -------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Tag {
    const TABLE: &'static str = "tags";
    const KIND: &'static str = "Tag";
    const UNIQUE_KEY: Option<&'static str> = Some("slug");
    const SEARCH_COLUMNS: &'static [&'static str] = &["name"];
    const SORT_COLUMNS: &'static [&'static str] = &["name", "created_at", "updated_at"];
    const DEFAULT_SORT: &'static str = "name";
    const DEFAULT_ORDER: SortOrder = SortOrder::Asc;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewTag {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
}

impl NewRecord for NewTag {
    type Entity = Tag;

    fn validate(&self) -> CoreResult<()> {
        require("name", &self.name)?;
        check("slug", validate_slug(&self.slug))
    }

    fn unique_value(&self) -> Option<String> {
        Some(self.slug.clone())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("name", FieldValue::from(self.name.trim())),
            ("slug", FieldValue::from(self.slug)),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TagPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
}

impl PatchRecord for TagPatch {
    type Entity = Tag;

    fn validate(&self) -> CoreResult<()> {
        if let Some(slug) = &self.slug {
            check("slug", validate_slug(slug))?;
        }
        Ok(())
    }

    fn unique_value(&self) -> Option<String> {
        self.slug.clone()
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "name", self.name);
        set_if_some(&mut fields, "slug", self.slug);
        Ok(fields)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: String,
    pub name: String,
    pub slug: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl Entity for Category {
    const TABLE: &'static str = "categories";
    const KIND: &'static str = "Category";
    const UNIQUE_KEY: Option<&'static str> = Some("slug");
    const SEARCH_COLUMNS: &'static [&'static str] = &["name", "description"];
    const SORT_COLUMNS: &'static [&'static str] = &["name", "created_at", "updated_at"];
    const DEFAULT_SORT: &'static str = "name";
    const DEFAULT_ORDER: SortOrder = SortOrder::Asc;

    fn id(&self) -> &str {
        &self.id
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewCategory {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub slug: String,
    pub description: Option<String>,
}

impl NewRecord for NewCategory {
    type Entity = Category;

    fn validate(&self) -> CoreResult<()> {
        require("name", &self.name)?;
        check("slug", validate_slug(&self.slug))
    }

    fn unique_value(&self) -> Option<String> {
        Some(self.slug.clone())
    }

    fn into_fields(self) -> CoreResult<Fields> {
        Ok(vec![
            ("name", FieldValue::from(self.name.trim())),
            ("slug", FieldValue::from(self.slug)),
            ("description", FieldValue::from(non_empty(self.description))),
        ])
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

impl PatchRecord for CategoryPatch {
    type Entity = Category;

    fn validate(&self) -> CoreResult<()> {
        if let Some(slug) = &self.slug {
            check("slug", validate_slug(slug))?;
        }
        Ok(())
    }

    fn unique_value(&self) -> Option<String> {
        self.slug.clone()
    }

    fn into_fields(self) -> CoreResult<Fields> {
        let mut fields = Fields::new();
        set_if_some(&mut fields, "name", self.name);
        set_if_some(&mut fields, "slug", self.slug);
        set_if_some(&mut fields, "description", self.description);
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{init_in_memory, EntityStore, ListQuery};

    #[tokio::test]
    async fn test_blog_tags_roundtrip_and_view_count() {
        let pool = init_in_memory().await.unwrap();
        let blogs = EntityStore::<Blog>::new(pool);

        let blog = blogs
            .create(NewBlog {
                slug: "shipping-rust".into(),
                title: "Shipping Rust".into(),
                excerpt: None,
                content: "Body".into(),
                author: "Ada".into(),
                category: Some("engineering".into()),
                tags: vec!["rust".into(), "axum".into()],
                cover_image: None,
                is_published: true,
            })
            .await
            .unwrap();
        assert_eq!(blog.tags, vec!["rust".to_string(), "axum".to_string()]);
        assert_eq!(blog.view_count, 0);

        blogs.increment(&blog.id, "view_count").await.unwrap();
        blogs.increment(&blog.id, "view_count").await.unwrap();
        let fetched = blogs.get_by_unique_key("shipping-rust").await.unwrap().unwrap();
        assert_eq!(fetched.view_count, 2);
    }

    #[tokio::test]
    async fn test_duplicate_slug_conflicts() {
        let pool = init_in_memory().await.unwrap();
        let books = EntityStore::<Book>::new(pool);

        let new_book = || NewBook {
            slug: "the-book".into(),
            title: "The Book".into(),
            author: "Ada".into(),
            description: None,
            cover_image: None,
            purchase_url: Some("https://shop.example.com/the-book".into()),
            is_published: false,
        };
        books.create(new_book()).await.unwrap();
        assert!(matches!(
            books.create(new_book()).await,
            Err(CoreError::Conflict(_))
        ));
    }

    #[tokio::test]
    async fn test_reviews_start_unapproved() {
        let pool = init_in_memory().await.unwrap();
        let reviews = EntityStore::<BlogReview>::new(pool);

        let review = reviews
            .create(NewBlogReview {
                blog_id: "b1".into(),
                name: "Reader".into(),
                email: "reader@example.com".into(),
                rating: 4,
                comment: "Helpful".into(),
            })
            .await
            .unwrap();
        assert!(!review.is_approved);

        let bad = reviews
            .create(NewBlogReview {
                blog_id: "b1".into(),
                name: "Reader".into(),
                email: "reader@example.com".into(),
                rating: 9,
                comment: "Too much".into(),
            })
            .await;
        assert!(matches!(bad, Err(CoreError::Validation { .. })));
    }

    #[tokio::test]
    async fn test_faqs_default_to_sort_order_ascending() {
        let pool = init_in_memory().await.unwrap();
        let faqs = EntityStore::<Faq>::new(pool);

        for (question, order) in [("Second?", 2), ("First?", 1), ("Third?", 3)] {
            faqs.create(NewFaq {
                question: question.into(),
                answer: "Yes".into(),
                category: None,
                sort_order: order,
                is_published: None,
            })
            .await
            .unwrap();
        }

        let page = faqs.list(&ListQuery::new()).await.unwrap();
        let questions: Vec<_> = page.items.iter().map(|f| f.question.as_str()).collect();
        assert_eq!(questions, vec!["First?", "Second?", "Third?"]);
        assert!(page.items.iter().all(|f| f.is_published));
    }
}
