//! Fetching: identity cache, conditions, lazy properties and polymorphism.

mod common;

use common::*;
use storable_orm::{Fetch, OrmError, Params, Query};

fn seed_blog(db: &TestDb) -> (i64, i64) {
    let session = db.session();
    let ann = new_user(&session, "ann@example.com");
    let bob = new_user(&session, "bob@example.com");
    session.set(&bob, "bio", Some("Writes about databases".to_string())).unwrap();
    session.store(&bob, false).unwrap();
    new_post(&session, "Indexes", Some(&ann));
    new_post(&session, "Joins", Some(&bob));
    new_post(&session, "Caching", Some(&bob));
    (ann.id().unwrap(), bob.id().unwrap())
}

#[test]
fn same_id_yields_same_instance() {
    let db = TestDb::new();
    let (ann, _) = seed_blog(&db);
    let session = db.session();

    let first = session.get_by_id::<User>(ann, Fetch::new()).unwrap().unwrap();
    let second = session.get_by_id::<User>(ann, Fetch::new()).unwrap().unwrap();
    assert!(first.is_same(&second));

    let listed = session
        .get_by_condition::<User>(
            &Query::new()
                .filter("email = {0}")
                .params(Params::positional(["ann@example.com"])),
        )
        .unwrap();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].is_same(&first));

    session.set(&first, "email", "ann@example.org".to_string()).unwrap();
    assert_eq!(second.email(&session).unwrap(), "ann@example.org");
}

#[test]
fn ids_keep_input_order_and_drop_the_rest() {
    let db = TestDb::new();
    let (ann, bob) = seed_blog(&db);
    let session = db.session();

    let users = session
        .get_by_ids::<User>(&[bob, 0, ann, -4, bob, 9_999], Fetch::new())
        .unwrap();
    let ids: Vec<Option<i64>> = users.iter().map(|u| u.id()).collect();
    assert_eq!(ids, [Some(bob), Some(ann)]);

    assert!(session.get_by_ids::<User>(&[], Fetch::new()).unwrap().is_empty());
    assert!(session.get_by_id::<User>(9_999, Fetch::new()).unwrap().is_none());
}

#[test]
fn only_uncached_ids_are_queried() {
    let db = TestDb::new();
    let (ann, bob) = seed_blog(&db);
    let (session, queries) = db.counted_session(true);

    session.get_by_id::<User>(ann, Fetch::new()).unwrap();
    assert_eq!(queries.get(), 1);
    session.get_by_ids::<User>(&[ann, bob], Fetch::new()).unwrap();
    assert_eq!(queries.get(), 2);
    session.get_by_ids::<User>(&[bob, ann], Fetch::new()).unwrap();
    assert_eq!(queries.get(), 2);
}

#[test]
fn conditions_follow_references() {
    let db = TestDb::new();
    seed_blog(&db);
    let session = db.session();

    let posts = session
        .get_by_condition::<Post>(
            &Query::new()
                .filter("author.email = {0}")
                .params(Params::positional(["bob@example.com"]))
                .sort("-title"),
        )
        .unwrap();
    let titles: Vec<String> = posts
        .iter()
        .map(|post| session.get::<_, String>(post, "title").unwrap())
        .collect();
    assert_eq!(titles, ["Joins", "Caching"]);

    let sorted = session
        .get_by_condition::<Post>(&Query::new().sort("+author.email").sort("+title").limit(2))
        .unwrap();
    let first: String = session.get(&sorted[0], "title").unwrap();
    assert_eq!(first, "Indexes");
    assert_eq!(sorted.len(), 2);

    let skipped = session
        .get_by_condition::<Post>(&Query::new().sort("+title").offset(1))
        .unwrap();
    assert_eq!(skipped.len(), 2);
}

#[test]
fn malformed_queries_are_usage_errors() {
    let db = TestDb::new();
    let session = db.session();

    let err = session
        .get_by_condition::<Post>(&Query::new().sort("title"))
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidSort(_)));

    let err = session
        .get_by_condition::<Post>(&Query::new().filter("title.author = 1"))
        .unwrap_err();
    assert!(matches!(err, OrmError::InvalidPath { .. }));

    let err = session
        .get_by_condition::<Post>(&Query::new().filter("title = {missing}"))
        .unwrap_err();
    assert!(matches!(
        err,
        OrmError::Core(storable_core::Error::MissingParameter(_))
    ));
}

#[test]
fn lazy_properties_load_on_first_access() {
    let db = TestDb::new();
    let (_, bob) = seed_blog(&db);
    let (session, queries) = db.counted_session(true);

    let user = session.get_by_id::<User>(bob, Fetch::new()).unwrap().unwrap();
    assert!(user.entity_ref().state().db_value("bio").is_none());
    let before = queries.get();

    let bio: Option<String> = user.bio(&session).unwrap();
    assert_eq!(bio.as_deref(), Some("Writes about databases"));
    assert_eq!(queries.get(), before + 1);

    user.bio(&session).unwrap();
    assert_eq!(queries.get(), before + 1);
}

#[test]
fn abstract_types_are_fetched_through_subtypes() {
    let db = TestDb::new();
    let page_id = {
        let session = db.session();
        new_post(&session, "A post", None);
        let page = Page {
            slug: "about".to_string(),
        }
        .into_entity(&session)
        .unwrap();
        session.set(&page, "title", "About".to_string()).unwrap();
        session.store(&page, false).unwrap();
        page.id().unwrap()
    };
    let session = db.session();

    let content = session
        .get_by_condition::<Content>(&Query::new().sort("+title"))
        .unwrap();
    let mut names: Vec<String> = content.iter().map(|c| c.entity_name()).collect();
    names.sort();
    assert_eq!(names, ["Blog\\Post", "Page"]);

    let page = session
        .get_by_id::<Content>(page_id, Fetch::new())
        .unwrap()
        .unwrap();
    assert_eq!(page.title(&session).unwrap(), "About");
    let page = page.cast::<Page>().expect("runtime type is Page");
    assert_eq!(page.slug(&session).unwrap(), "about");
    assert!(page.cast::<Post>().is_none());

    let limited = session
        .get_by_condition::<Content>(&Query::new().limit(1))
        .unwrap();
    assert_eq!(limited.len(), 1);
}

#[test]
fn unreadable_instances_are_filtered() {
    let db = TestDb::new();
    let (shown, hidden) = {
        let session = db.session();
        let mut ids = Vec::new();
        for (label, hidden) in [("shown", false), ("hidden", true)] {
            let note = Note {
                label: label.to_string(),
                hidden,
            }
            .into_entity(&session)
            .unwrap();
            session.store(&note, false).unwrap();
            ids.push(note.id().unwrap());
        }
        (ids[0], ids[1])
    };
    let session = db.session();

    let notes = session.get_by_condition::<Note>(&Query::new()).unwrap();
    assert_eq!(notes.len(), 1);
    assert_eq!(notes[0].id(), Some(shown));

    assert!(session.get_by_id::<Note>(hidden, Fetch::new()).unwrap().is_none());
    let note = session
        .get_by_id::<Note>(hidden, Fetch::new().unchecked())
        .unwrap()
        .unwrap();
    assert_eq!(note.label(&session).unwrap(), "hidden");

    // Readability is rechecked on cache hits.
    session.set(&note, "hidden", false).unwrap();
    assert!(session.get_by_id::<Note>(hidden, Fetch::new()).unwrap().is_some());
}

#[test]
fn unknown_connection_is_reported() {
    let db = TestDb::new();
    let session = db.session();
    let err = session
        .get_by_id::<User>(1, Fetch::new().on("replica"))
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownConnection(ref id) if id == "replica"));
}
