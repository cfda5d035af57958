//! Batched reference loading.

mod common;

use common::*;
use storable_orm::Query;

fn seed(db: &TestDb) {
    let session = db.session();
    for i in 0..50 {
        let user = new_user(&session, &format!("user{i}@example.com"));
        new_post(&session, &format!("Post {i}"), Some(&user));
    }
}

fn author_emails(session: &storable_orm::Session) -> Vec<String> {
    let posts = session
        .get_by_condition::<Post>(&Query::new().sort("+id"))
        .unwrap();
    assert_eq!(posts.len(), 50);
    posts
        .iter()
        .map(|post| {
            let author = post.author(session).unwrap().expect("post has an author");
            author.email(session).unwrap()
        })
        .collect()
}

#[test]
fn fifty_authors_load_in_one_query() {
    let db = TestDb::new();
    seed(&db);
    let (session, queries) = db.counted_session(true);

    let posts = session
        .get_by_condition::<Post>(&Query::new().sort("+id"))
        .unwrap();
    let before = queries.get();
    for post in &posts {
        assert!(post.author(&session).unwrap().is_some());
    }
    assert_eq!(queries.get() - before, 1);
}

#[test]
fn without_prefetch_each_author_is_one_query() {
    let db = TestDb::new();
    seed(&db);
    let (session, queries) = db.counted_session(false);

    let posts = session
        .get_by_condition::<Post>(&Query::new().sort("+id"))
        .unwrap();
    let before = queries.get();
    for post in &posts {
        assert!(post.author(&session).unwrap().is_some());
    }
    assert_eq!(queries.get() - before, 50);
}

#[test]
fn prefetch_does_not_change_results() {
    let db = TestDb::new();
    seed(&db);

    let (with, _) = db.counted_session(true);
    let (without, _) = db.counted_session(false);
    let batched = author_emails(&with);
    let single = author_emails(&without);

    assert_eq!(batched.len(), 50);
    assert_eq!(batched, single);
    assert_eq!(batched[7], "user7@example.com");
}

#[test]
fn shared_author_resolves_to_one_instance() {
    let db = TestDb::new();
    {
        let session = db.session();
        let ann = new_user(&session, "ann@example.com");
        new_post(&session, "First", Some(&ann));
        new_post(&session, "Second", Some(&ann));
        new_post(&session, "Orphan", None);
    }

    let (session, _) = db.counted_session(true);
    let posts = session
        .get_by_condition::<Post>(&Query::new().sort("+id"))
        .unwrap();
    let first = posts[0].author(&session).unwrap().unwrap();
    let second = posts[1].author(&session).unwrap().unwrap();
    assert!(first.is_same(&second));
    assert!(posts[2].author(&session).unwrap().is_none());
}
