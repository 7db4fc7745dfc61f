mod common;
use common::*;

use flint_db::UpdateOptions;
use serde_json::json;

#[test]
fn identifier_round_trips_through_a_custom_id_field() {
    let db = temp_db();
    let accounts = db.collection("accounts", Some("accountId")).unwrap();

    let inserted = accounts.insert(json!({"name": "Acme"})).unwrap();
    let id = inserted["accountId"].clone();

    let found = accounts.find_one(&json!({"accountId": id})).unwrap().unwrap();
    assert_eq!(found, inserted);
}

#[test]
fn replacement_preserves_identifier_and_strips_it_from_the_json_column() {
    let db = temp_db();
    let people = seed_simpsons(&db);

    let homer = people.find_one(&json!({"firstname": "Homer"})).unwrap().unwrap();
    let id = homer["_id"].clone();

    people
        .update(&json!({"_id": id.clone()}), &json!({"firstname": "Homer J.", "lastname": "Simpson"}), UpdateOptions::default())
        .unwrap();

    let updated = people.find_one(&json!({"_id": id.clone()})).unwrap().unwrap();
    assert_eq!(updated["_id"], id);
    assert_eq!(updated["firstname"], json!("Homer J."));
}

#[test]
fn upsert_is_idempotent_after_the_first_insert() {
    let db = temp_db();
    let people = db.collection("people", None).unwrap();

    let options = UpdateOptions { multi: false, upsert: true };
    people.update(&json!({"firstname": "Maggie"}), &json!({"$set": {"age": 1}}), options).unwrap();
    people.update(&json!({"firstname": "Maggie"}), &json!({"$set": {"age": 2}}), options).unwrap();

    let rows = people.find(&json!({"firstname": "Maggie"}), None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["age"], json!(2));
}

#[test]
fn add_to_set_never_duplicates_a_value() {
    let db = temp_db();
    let people = db.collection("people", None).unwrap();
    people.insert(json!({"firstname": "Lisa", "hobbies": ["saxophone"]})).unwrap();

    for _ in 0..3 {
        people
            .update(&json!({"firstname": "Lisa"}), &json!({"$addToSet": {"hobbies": "saxophone"}}), UpdateOptions::default())
            .unwrap();
    }
    people
        .update(&json!({"firstname": "Lisa"}), &json!({"$addToSet": {"hobbies": "boxcar racing"}}), UpdateOptions::default())
        .unwrap();

    let lisa = people.find_one(&json!({"firstname": "Lisa"})).unwrap().unwrap();
    let hobbies = lisa["hobbies"].as_array().unwrap();
    assert_eq!(hobbies.len(), 2);
    assert_eq!(hobbies.iter().filter(|h| **h == json!("saxophone")).count(), 1);
}

#[test]
fn array_index_side_table_matches_primary_table_after_mutation() {
    let db = temp_db();
    let people = db.collection("people", None).unwrap();
    people.ensure_array_index("hobbies", None).unwrap();

    let bart = people.insert(json!({"firstname": "Bart", "hobbies": ["skateboarding"]})).unwrap();
    people
        .update(&json!({"_id": bart["_id"].clone()}), &json!({"$push": {"hobbies": "annoying Homer"}}), UpdateOptions::default())
        .unwrap();

    let by_index = people.find(&json!({"hobbies": {"$in": ["annoying Homer"]}}), None).unwrap();
    assert_eq!(by_index.len(), 1);
    assert_eq!(by_index[0]["firstname"], json!("Bart"));

    people.delete(&json!({"_id": bart["_id"].clone()}), Default::default()).unwrap();
    let after_delete = people.find(&json!({"hobbies": {"$in": ["annoying Homer"]}}), None).unwrap();
    assert!(after_delete.is_empty());
}
