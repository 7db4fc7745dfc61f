use flint_db::{Collection, Database, OpenOptions};
use serde_json::json;

/// A `Database` backed by a real file in a fresh temp directory, exercising
/// the same `SqliteConnection::open` path a caller hits in production. The
/// directory is leaked for the process lifetime rather than threaded through
/// every test signature; `cargo test` tears it down along with the temp root.
pub fn temp_db() -> Database {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("flint.db");
    let db = Database::open(&path, OpenOptions::default()).unwrap();
    std::mem::forget(dir);
    db
}

/// The literal six-document `people` fixture the scenarios are written
/// against: two Lisas disambiguated only by surname, a Maggie/Marge/Bart/
/// Homer each with their own `hobbies`, shared `annoying Homer`/`boxcar
/// racing` entries to exercise multi-value `$in`, and a Marge with no
/// `hobbies` key at all.
pub fn seed_simpsons(db: &Database) -> Collection<'_> {
    let people = db.collection("people", None).unwrap();
    people
        .insert_many(vec![
            json!({"firstname": "Maggie", "lastname": "Simpson", "hobbies": ["dummies"]}),
            json!({"firstname": "Bart", "lastname": "Simpson", "hobbies": ["skateboarding", "boxcar racing", "annoying Homer"]}),
            json!({"firstname": "Marge", "lastname": "Simpson"}),
            json!({"firstname": "Homer", "lastname": "Simpson", "hobbies": ["drinking", "gambling", "boxcar racing"]}),
            json!({"firstname": "Lisa", "lastname": "Simpson", "hobbies": ["tai chi", "chai tea", "annoying Homer"]}),
            json!({"firstname": "Lisa", "lastname": "Kudrow"}),
        ])
        .unwrap();
    people
}
