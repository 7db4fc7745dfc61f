mod common;
use common::*;

use flint_db::SortDirection;
use serde_json::json;

#[test]
fn cursor_filters_and_sorts() {
    let db = temp_db();
    let people = seed_simpsons(&db);

    let rows = people
        .cursor()
        .filter(json!({"lastname": "Simpson"}))
        .sort("firstname", SortDirection::Asc)
        .run()
        .unwrap();

    let names: Vec<_> = rows.iter().map(|r| r["firstname"].as_str().unwrap().to_string()).collect();
    assert_eq!(names, vec!["Bart", "Homer", "Lisa", "Maggie", "Marge"]);
}

#[test]
fn cursor_skip_and_take_page_through_results() {
    let db = temp_db();
    let people = seed_simpsons(&db);

    let page = people
        .cursor()
        .filter(json!({"lastname": "Simpson"}))
        .sort("firstname", SortDirection::Asc)
        .skip(1)
        .take(2)
        .run()
        .unwrap();

    assert_eq!(page.len(), 2);
    assert_eq!(page[0]["firstname"], json!("Homer"));
    assert_eq!(page[1]["firstname"], json!("Lisa"));
}

#[test]
fn cursor_chaining_does_not_mutate_the_original() {
    let db = temp_db();
    let people = seed_simpsons(&db);

    let base = people.cursor().filter(json!({"lastname": "Simpson"}));
    let narrowed = base.filter(json!({"firstname": "Bart"}));

    assert_eq!(base.run().unwrap().len(), 5);
    assert_eq!(narrowed.run().unwrap().len(), 1);
}

#[test]
fn cursor_count_ignores_skip_and_take() {
    let db = temp_db();
    let people = seed_simpsons(&db);

    let cursor = people.cursor().filter(json!({"lastname": "Simpson"})).skip(1).take(1);
    assert_eq!(cursor.count().unwrap(), 5);
    assert_eq!(cursor.run().unwrap().len(), 1);
}

#[test]
fn cursor_run_one_narrows_to_a_single_document() {
    let db = temp_db();
    let people = seed_simpsons(&db);

    let doc = people.cursor().filter(json!({"firstname": "Homer"})).run_one().unwrap();
    assert!(doc.is_some());
}
