use assert_cmd::prelude::*; // Add methods on commands
use predicates::prelude::*;
use std::io::Write;
use std::process::Command; // Run programs
use tempfile;
type STDRESULT = Result<(),Box<dyn std::error::Error>>;

/// encode a UTF-16LE string with its count and padding prefix
fn push_string(buf: &mut Vec<u8>,s: &str) {
    buf.extend_from_slice(&(s.len() as u16).to_le_bytes());
    buf.extend_from_slice(&[0,0]);
    for unit in s.encode_utf16() {
        buf.extend_from_slice(&unit.to_le_bytes());
    }
}

fn push_empty_footer(buf: &mut Vec<u8>) {
    buf.extend_from_slice(&[0,1,0,0,0,0,0,0]);
    buf.extend_from_slice(&[0,0,0]);
    buf.extend_from_slice(&0u16.to_le_bytes());
    buf.extend_from_slice(&[0,0]);
}

/// A minimal but complete replay payload: GM root holding FH ("Hi") and
/// MP/ST with gamename = "Test" and playercount = 4, then a one-group
/// command stream selecting unit 7.
fn replay_payload() -> Vec<u8> {
    let mut data = vec![0u8;257];
    data.extend_from_slice(b"GM");
    data.extend_from_slice(&110u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"FH");
    data.extend_from_slice(&12u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"Hi");
    data.resize(281,0);
    data.extend_from_slice(b"MP");
    data.extend_from_slice(&86u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    data.extend_from_slice(b"ST");
    data.extend_from_slice(&80u16.to_le_bytes());
    data.extend_from_slice(&[0,0,0,0,0,0]);
    data.extend_from_slice(&2u16.to_le_bytes());
    data.extend_from_slice(&[0,0]);
    push_string(&mut data,"gamename");
    data.extend_from_slice(&10u16.to_le_bytes());
    data.extend_from_slice(&[0,0,0,0]);
    push_string(&mut data,"Test");
    push_string(&mut data,"playercount");
    data.extend_from_slice(&4u16.to_le_bytes());
    data.extend_from_slice(&[0,0,0,0]);
    data.extend_from_slice(&4i16.to_le_bytes());
    assert_eq!(data.len(),373); // root node ends here
    push_empty_footer(&mut data);
    data.extend_from_slice(&[0u8;5]);
    data.extend_from_slice(&0x80u32.to_le_bytes());
    data.push(0);
    data.extend_from_slice(&[0,0,0,0]);
    data.push(1);
    data.extend_from_slice(&7u32.to_le_bytes());
    push_empty_footer(&mut data);
    data.extend_from_slice(&1u32.to_le_bytes());
    data.push(0);
    data.push(0);
    data
}

fn wrap_l33t(payload: &[u8]) -> Vec<u8> {
    let mut enc = flate2::write::ZlibEncoder::new(Vec::new(),flate2::Compression::default());
    enc.write_all(payload).expect("deflate failed");
    let z = enc.finish().expect("deflate failed");
    let mut out = b"l33t".to_vec();
    out.extend_from_slice(&(z.len() as i32).to_le_bytes());
    out.extend_from_slice(&z);
    out
}

const EXPECTED_JSON: &str = "{
    \"build_string\": \"Hi\",
    \"profile_keys\": {
        \"gamename\": \"Test\",
        \"playercount\": 4
    }
}";

#[test]
fn decode_to_stdout() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let rec_path = temp_dir.path().join("match.rec");
    std::fs::write(&rec_path,wrap_l33t(&replay_payload()))?;
    let mut cmd = Command::cargo_bin("replaydecoder")?;
    cmd.arg(&rec_path)
        .assert()
        .success()
        .stdout(predicate::str::contains(EXPECTED_JSON));
    Ok(())
}

#[test]
fn decode_gzip_wrapped() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let rec_path = temp_dir.path().join("match.rec.gz");
    let mut enc = flate2::write::GzEncoder::new(Vec::new(),flate2::Compression::default());
    enc.write_all(&wrap_l33t(&replay_payload()))?;
    std::fs::write(&rec_path,enc.finish()?)?;
    let mut cmd = Command::cargo_bin("replaydecoder")?;
    cmd.arg("--is-gzip").arg(&rec_path)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"build_string\": \"Hi\""));
    Ok(())
}

#[test]
fn write_json_file_quietly() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let rec_path = temp_dir.path().join("match.rec");
    let out_path = temp_dir.path().join("match.json");
    std::fs::write(&rec_path,wrap_l33t(&replay_payload()))?;
    let mut cmd = Command::cargo_bin("replaydecoder")?;
    cmd.arg("-q")
        .arg("-o").arg(&out_path)
        .arg(&rec_path)
        .assert()
        .success()
        .stdout(predicate::str::is_empty());
    assert_eq!(std::fs::read_to_string(out_path)?,EXPECTED_JSON);
    Ok(())
}

#[test]
fn corrupt_file_fails() -> STDRESULT {
    let temp_dir = tempfile::tempdir()?;
    let rec_path = temp_dir.path().join("match.rec");
    std::fs::write(&rec_path,b"abcd not a replay")?;
    let mut cmd = Command::cargo_bin("replaydecoder")?;
    cmd.arg(&rec_path)
        .assert()
        .failure();
    Ok(())
}
