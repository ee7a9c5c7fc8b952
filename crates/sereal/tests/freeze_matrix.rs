//! FREEZE handling: destination unmarshalers, the class registry, byte
//! destinations, and compat-mode wrapping.

use sereal::{
    decode, register_class, Bind, Decoder, FreezeUnmarshal, Result, SerealError, Val, Value,
};

fn v1_doc(body: &[u8]) -> Vec<u8> {
    let mut doc = vec![0x3d, 0x73, 0x72, 0x6c, 0x01, 0x00];
    doc.extend_from_slice(body);
    doc
}

/// OBJECT_FREEZE <class> BINARY <payload>
fn freeze_doc(class: &[u8], payload: &[u8]) -> Vec<u8> {
    let mut body = vec![0x32, 0x60 | class.len() as u8];
    body.extend_from_slice(class);
    body.push(0x26);
    body.push(payload.len() as u8);
    body.extend_from_slice(payload);
    v1_doc(&body)
}

#[derive(Default, Debug, PartialEq)]
struct Token {
    raw: Vec<u8>,
}

impl FreezeUnmarshal for Token {
    fn unmarshal_frozen(
        &mut self,
        payload: &[u8],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        self.raw = payload.to_vec();
        Ok(())
    }
}

impl Bind for Token {
    fn bind(&mut self, _v: &Val) -> Result<()> {
        Err(SerealError::BadDestination("Token only accepts FREEZE"))
    }

    fn bind_frozen(&mut self, _class: &str, payload: &[u8]) -> Result<bool> {
        self.raw = payload.to_vec();
        Ok(true)
    }
}

#[derive(Default)]
struct Refusenik;

impl FreezeUnmarshal for Refusenik {
    fn unmarshal_frozen(
        &mut self,
        _payload: &[u8],
    ) -> std::result::Result<(), Box<dyn std::error::Error + Send + Sync>> {
        Err("payload rejected".into())
    }
}

#[test]
fn registered_class_unmarshals_into_dynamic_slot() {
    register_class::<Token>("FreezeReg");
    let doc = freeze_doc(b"FreezeReg", b"x");
    let mut v = Value::Undef;
    decode(&doc, &mut v).unwrap();
    let Value::Frozen(frozen) = &v else {
        panic!("expected frozen value, got {v:?}");
    };
    assert_eq!(frozen.class, "FreezeReg");
    assert_eq!(frozen.payload, b"x");
    assert_eq!(frozen.downcast::<Token>().unwrap().raw, b"x");
}

#[test]
fn destination_unmarshaler_wins() {
    // no registration needed: the typed destination consumes the payload
    let doc = freeze_doc(b"FreezeDirect", b"abc");
    let mut token = Token::default();
    decode(&doc, &mut token).unwrap();
    assert_eq!(token.raw, b"abc");
}

#[test]
fn unregistered_class_stays_a_record() {
    let doc = freeze_doc(b"FreezeNobody", b"p");
    let mut v = Value::Undef;
    decode(&doc, &mut v).unwrap();
    assert_eq!(
        v,
        Value::Freeze {
            class: "FreezeNobody".to_owned(),
            payload: b"p".to_vec(),
        }
    );
}

#[test]
fn byte_destination_takes_raw_payload() {
    let doc = freeze_doc(b"FreezeBytes", b"raw");
    let mut bytes: Vec<u8> = Vec::new();
    decode(&doc, &mut bytes).unwrap();
    assert_eq!(bytes, b"raw");
}

#[test]
fn scalar_destination_reports_missing_unmarshaler() {
    let doc = freeze_doc(b"FreezeScalar", b"p");
    let mut n: i64 = 0;
    match decode(&doc, &mut n) {
        Err(SerealError::UnmarshalerMissing(class)) => assert_eq!(class, "FreezeScalar"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn failing_unmarshaler_surfaces_the_class() {
    register_class::<Refusenik>("FreezeSour");
    let doc = freeze_doc(b"FreezeSour", b"p");
    match decode(&doc, &mut Value::Undef) {
        Err(SerealError::UnmarshalerFailed { class, reason }) => {
            assert_eq!(class, "FreezeSour");
            assert!(reason.contains("rejected"));
        }
        other => panic!("unexpected result: {other:?}"),
    }
}

#[test]
fn compat_mode_always_wraps() {
    register_class::<Token>("FreezeCompat");
    let doc = freeze_doc(b"FreezeCompat", b"x");
    let mut v = Value::Undef;
    Decoder { compat_mode: true }.decode(&doc, &mut v).unwrap();
    assert_eq!(
        v,
        Value::Freeze {
            class: "FreezeCompat".to_owned(),
            payload: b"x".to_vec(),
        }
    );
}

#[test]
fn objectv_freeze_reuses_class_name() {
    // ARRAYREF_2 of [OBJECT_FREEZE "Fz" "x", OBJECTV_FREEZE ->8 "y"]
    // offsets (v1): class name token at 8
    let doc = v1_doc(&[
        0x42, 0x32, 0x62, b'F', b'z', 0x26, 0x01, b'x', 0x33, 0x08, 0x26, 0x01, b'y',
    ]);
    let mut v = Value::Undef;
    decode(&doc, &mut v).unwrap();
    let Value::Array(elems) = &v else {
        panic!("expected array");
    };
    for (elem, payload) in elems.iter().zip([b"x", b"y"]) {
        let value = elem.borrow();
        let Value::Freeze { class, payload: p } = &*value else {
            panic!("expected freeze record");
        };
        assert_eq!(class, "Fz");
        assert_eq!(p, payload);
    }
}

#[test]
fn freeze_class_name_must_be_stringish() {
    let doc = v1_doc(&[0x32, 0x01, 0x26, 0x01, b'x']);
    assert!(matches!(
        decode(&doc, &mut Value::Undef),
        Err(SerealError::ExpectedStringish)
    ));
}
