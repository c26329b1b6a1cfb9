use meld_voice::session::{Speaker, TranscriptAssembler};

#[test]
fn test_input_fragments_commit_as_one_user_entry() {
    let mut transcript = TranscriptAssembler::new();
    transcript.append_input("a");
    transcript.append_input("b");

    let committed = transcript.commit_turn();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].speaker, Speaker::User);
    assert_eq!(committed[0].text, "ab");
    assert_eq!(transcript.entries(), committed.as_slice());
}

#[test]
fn test_empty_turn_commits_nothing() {
    let mut transcript = TranscriptAssembler::new();
    assert!(transcript.commit_turn().is_empty());
    assert!(transcript.entries().is_empty());
}

#[test]
fn test_model_only_turn() {
    let mut transcript = TranscriptAssembler::new();
    transcript.append_output("Sure, ");
    transcript.append_output("here you go.");

    let committed = transcript.commit_turn();
    assert_eq!(committed.len(), 1);
    assert_eq!(committed[0].speaker, Speaker::Model);
    assert_eq!(committed[0].text, "Sure, here you go.");
}

#[test]
fn test_committed_entries_are_not_touched_by_later_turns() {
    let mut transcript = TranscriptAssembler::new();
    transcript.append_input("first");
    transcript.append_output("reply");
    transcript.commit_turn();
    let snapshot = transcript.entries().to_vec();

    transcript.append_input("second");
    transcript.commit_turn();

    assert_eq!(&transcript.entries()[..2], snapshot.as_slice());
    assert_eq!(transcript.entries().len(), 3);
    assert_eq!(transcript.entries()[2].text, "second");
}

#[test]
fn test_entries_serialize_with_lowercase_speaker() {
    let mut transcript = TranscriptAssembler::new();
    transcript.append_input("hello");
    let entry = transcript.commit_turn().remove(0);

    let json = serde_json::to_value(&entry).unwrap();
    assert_eq!(json["speaker"], "user");
    assert_eq!(json["text"], "hello");
    assert!(json["committed_at"].is_string());
}
