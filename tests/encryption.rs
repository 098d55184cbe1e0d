mod common;

use std::rc::Rc;

use rusqlite::types::Value as SqlValue;

use common::{ACCOUNT, PASSPHRASE, session, session_with_depth};
use sisma::SismaError;
use sisma::adapter::Bindings;
use sisma::cipher::PropertyCipher;
use sisma::datatype::Value;
use sisma::entity::EntityRef;
use sisma::session::Session;

fn account(session: &Rc<Session>) -> EntityRef {
    let account = session.create_entity(ACCOUNT).unwrap();
    {
        let mut a = account.borrow_mut();
        a.set("secret", "the eagle flies at midnight").unwrap();
        a.set("pin", 4711).unwrap();
        a.set("avatar", vec![0u8, 159, 146, 150, 255]).unwrap();
    }
    session.mapper().save(&account).unwrap();
    account
}

fn stored(session: &Rc<Session>, column: &str, id: i64) -> SqlValue {
    let mut bindings = Bindings::new();
    bindings.push(id);
    let mut rows = session
        .adapter()
        .select(&format!("select {} from account where id = ?", column), &bindings)
        .unwrap()
        .unwrap();
    rows.fetch().unwrap().get(column).cloned().unwrap()
}

#[test]
fn encrypted_properties_round_trip() {
    let session = session();
    let id = account(&session).borrow().id().unwrap();
    session.clear_cache();
    let loaded = session.find_entity(ACCOUNT, id).unwrap().unwrap();
    let mut loaded = loaded.borrow_mut();
    assert_eq!(
        loaded.get("secret").unwrap(),
        Value::from("the eagle flies at midnight")
    );
    assert_eq!(loaded.get("pin").unwrap(), Value::from(4711));
    assert_eq!(
        loaded.get("avatar").unwrap(),
        Value::Binary(vec![0, 159, 146, 150, 255])
    );
    assert_eq!(loaded.get("active").unwrap(), Value::from(true));
}

#[test]
fn stored_values_are_not_plaintext() {
    let session = session();
    let id = account(&session).borrow().id().unwrap();
    match stored(&session, "secret", id) {
        SqlValue::Text(text) => {
            assert_ne!(text, "the eagle flies at midnight");
            assert!(!text.contains("eagle"));
        }
        other => panic!("unexpected {:?}", other),
    }
    match stored(&session, "pin", id) {
        SqlValue::Text(text) => assert_ne!(text, "4711"),
        other => panic!("unexpected {:?}", other),
    }
    // plain properties stay readable
    assert_eq!(stored(&session, "active", id), SqlValue::Integer(1));
}

#[test]
fn the_initialization_vector_changes_on_every_save() {
    let session = session();
    let account = account(&session);
    let id = account.borrow().id().unwrap();
    let first_iv = account.borrow().value("initializationVector").cloned().unwrap();
    let first_secret = stored(&session, "secret", id);

    account.borrow_mut().set("secret", "the eagle flies at midnight").unwrap();
    session.mapper().save(&account).unwrap();
    let second_iv = account.borrow().value("initializationVector").cloned().unwrap();
    assert_ne!(first_iv, second_iv);
    // same plaintext, different ciphertext
    assert_ne!(first_secret, stored(&session, "secret", id));
    assert_eq!(
        stored(&session, "initialization_vector", id),
        SqlValue::Text(second_iv.as_str().unwrap().to_string())
    );
}

#[test]
fn tampered_values_fail_to_decrypt() {
    let session = session();
    let id = account(&session).borrow().id().unwrap();
    session
        .adapter()
        .execute_batch(&format!(
            "update account set secret = 'AAAAAAAAAAAAAAAAAAAAAAAA' where id = {}",
            id
        ))
        .unwrap();
    session.clear_cache();
    match session.find_entity(ACCOUNT, id) {
        Err(SismaError::Decryption { property, .. }) => assert_eq!(property, "secret"),
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn encrypted_properties_need_a_key() {
    let session = session_with_depth(64);
    let account = session.create_entity(ACCOUNT).unwrap();
    account.borrow_mut().set("secret", "hush").unwrap();
    assert!(matches!(
        session.mapper().save(&account),
        Err(SismaError::Encryption(_))
    ));
    assert_eq!(account.borrow().id(), None);

    // nor can stored rows be read
    session
        .adapter()
        .execute_batch(
            "insert into account (secret, active, initialization_vector)
             values ('c2VjcmV0', 1, 'AAAAAAAAAAAAAAAAAAAAAA==')",
        )
        .unwrap();
    assert!(matches!(
        session.find_entity(ACCOUNT, 1),
        Err(SismaError::Decryption { .. })
    ));
}

#[test]
fn cipher_binds_ciphertext_to_key_and_property() {
    let cipher = PropertyCipher::from_passphrase(PASSPHRASE);
    let iv = PropertyCipher::generate_iv();
    let secret = cipher.encrypt("secret", b"same words", &iv).unwrap();
    let pin = cipher.encrypt("pin", b"same words", &iv).unwrap();
    assert_ne!(secret, pin);
    assert_eq!(cipher.decrypt("secret", &secret, &iv).unwrap(), b"same words");
    // moved to another property
    assert!(matches!(
        cipher.decrypt("pin", &secret, &iv),
        Err(SismaError::Decryption { .. })
    ));
    let other = PropertyCipher::from_passphrase("another passphrase");
    assert!(other.decrypt("secret", &secret, &iv).is_err());
    assert!(matches!(
        cipher.encrypt("secret", b"x", "too short"),
        Err(SismaError::Encryption(_))
    ));
    assert_eq!(format!("{:?}", cipher), "PropertyCipher(..)");
}
