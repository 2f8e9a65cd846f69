use std::sync::atomic::Ordering;
use std::sync::Arc;

use llm_provider::{build_prompt, cancel_signal, GenerationError, GenerationStatus, Message, OutputShape, Role};
use llm_provider_mock::{ScriptedEnd, ScriptedGenerator, ScriptedResponse};
use pretty_assertions::assert_eq;
use reasoner::{
    CollectingSink, DecodedSegment, NullSink, ReasoningController, ReasoningError,
    ReasoningRequest, ReasoningSettings, RunPhase, SegmentKind, Strategy, VERIFY_PROMPT,
};

fn controller(generator: &Arc<ScriptedGenerator>) -> ReasoningController {
    ReasoningController::new(
        generator.clone(),
        ReasoningSettings::default().with_system_prompt("S"),
    )
    .expect("valid settings")
}

fn scripted(responses: Vec<ScriptedResponse>) -> Arc<ScriptedGenerator> {
    Arc::new(ScriptedGenerator::new(responses))
}

#[test]
fn single_shot_splits_thinking_from_answer() {
    let generator = scripted(vec![ScriptedResponse::chunks([
        "<thi",
        "nk>reasoning</thi",
        "nk>Paris",
    ])]);
    let mut sink = CollectingSink::default();

    let result = controller(&generator)
        .run(
            Strategy::Single,
            &ReasoningRequest::new("Capital of France?")
                .with_temperature(0.3)
                .with_show_thinking(true),
            &cancel_signal(),
            &mut sink,
        )
        .expect("single shot succeeds");

    assert_eq!(result.final_answer, "Paris");
    assert_eq!(result.thinking, "reasoning");
    assert_eq!(result.status, GenerationStatus::Completed);
    assert_eq!(result.samples, None);
    assert_eq!(
        sink.segments,
        vec![
            DecodedSegment::thinking("reasoning"),
            DecodedSegment::answer("Paris")
        ]
    );
    assert_eq!(sink.phases, vec![RunPhase::Answer]);

    let request = &generator.requests()[0];
    assert_eq!(
        request.messages,
        vec![Message::system("S"), Message::user("Capital of France?")]
    );
    assert_eq!(request.temperature, 0.3);
    assert!(request.show_thinking);
}

#[test]
fn hidden_thinking_is_still_decoded_but_not_displayed() {
    let generator = scripted(vec![ScriptedResponse::chunks(["<think>x</think>Answer"])]);
    let mut sink = CollectingSink::default();

    let result = controller(&generator)
        .single(&ReasoningRequest::new("q"), &cancel_signal(), &mut sink)
        .expect("single shot succeeds");

    assert_eq!(result.final_answer, "Answer");
    assert_eq!(result.thinking, "x");
    assert!(sink
        .segments
        .iter()
        .all(|segment| segment.kind == SegmentKind::Answer));
}

#[test]
fn history_is_sent_between_system_prompt_and_question() {
    let generator = scripted(vec![ScriptedResponse::text("Sure.")]);
    let history = vec![
        Message::system("ignored"),
        Message::user("earlier question"),
        Message::assistant("earlier answer"),
    ];

    controller(&generator)
        .single(
            &ReasoningRequest::new("follow up").with_history(&history),
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("single shot succeeds");

    let roles: Vec<Role> = generator.requests()[0]
        .messages
        .iter()
        .map(|message| message.role.clone())
        .collect();
    assert_eq!(
        roles,
        vec![Role::System, Role::User, Role::Assistant, Role::User]
    );
    assert_eq!(generator.requests()[0].messages[0].content, "S");
}

#[test]
fn timed_out_call_returns_partial_answer_with_status() {
    let generator = scripted(vec![
        ScriptedResponse::chunks(["Partial ", "answ"]).ending(ScriptedEnd::TimedOut)
    ]);

    let result = controller(&generator)
        .single(&ReasoningRequest::new("q"), &cancel_signal(), &mut NullSink)
        .expect("timeouts are not errors");

    assert_eq!(result.status, GenerationStatus::TimedOut);
    assert_eq!(result.final_answer, "Partial answ");
}

#[test]
fn echoed_prompt_generators_are_gated_on_the_role_marker() {
    let generator = Arc::new(
        ScriptedGenerator::new(vec![ScriptedResponse::chunks([
            "llama_model_loader: loaded meta data\n",
            "System: S\n",
            "\n",
            "User: q\n",
            "\n",
            "Assistant: <think>r</think> 42\n",
        ])])
        .with_output_shape(OutputShape::EchoedPrompt),
    );

    let result = controller(&generator)
        .single(&ReasoningRequest::new("q"), &cancel_signal(), &mut NullSink)
        .expect("single shot succeeds");

    assert_eq!(result.final_answer, "42");
    assert!(!result.used_fallback);
}

fn echoed(messages: &[Message], reply: &str) -> ScriptedResponse {
    let prompt = build_prompt(messages).expect("valid prompt");
    let output = format!("llama_model_loader: loaded meta data\n{prompt}{reply}\n");
    ScriptedResponse::text(&output)
}

#[test]
fn echoed_history_does_not_leak_into_the_answer() {
    let history = vec![Message::user("hi"), Message::assistant("Hello!")];
    let generator = Arc::new(
        ScriptedGenerator::new(vec![echoed(
            &[
                Message::system("S"),
                Message::user("hi"),
                Message::assistant("Hello!"),
                Message::user("2+3?"),
            ],
            " 5",
        )])
        .with_output_shape(OutputShape::EchoedPrompt),
    );

    let result = controller(&generator)
        .single(
            &ReasoningRequest::new("2+3?").with_history(&history),
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("single shot succeeds");

    assert_eq!(result.final_answer, "5");
    assert!(!result.used_fallback);
}

#[test]
fn echoed_verification_prompt_is_not_read_as_confirmation() {
    let base = [Message::system("S"), Message::user("2+3?")];
    let round = |previous: &str| {
        let mut messages = base.to_vec();
        messages.push(Message::assistant(previous));
        messages.push(Message::user(VERIFY_PROMPT));
        messages
    };
    let generator = Arc::new(
        ScriptedGenerator::new(vec![
            echoed(&base, " 6"),
            echoed(&round("6"), " The answer is 5."),
            echoed(&round("The answer is 5."), " The sum is 5."),
        ])
        .with_output_shape(OutputShape::EchoedPrompt),
    );

    let result = controller(&generator)
        .run(
            Strategy::Verify { max_iterations: 2 },
            &ReasoningRequest::new("2+3?").with_temperature(0.5),
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("verify succeeds");

    assert_eq!(result.final_answer, "The sum is 5.");
    assert_eq!(result.iterations, 2);
    assert_eq!(generator.call_count(), 3);
}

#[test]
fn vote_picks_exact_majority_and_keeps_raw_samples() {
    let generator = scripted(vec![
        ScriptedResponse::text("Paris"),
        ScriptedResponse::text(" Paris\n"),
        ScriptedResponse::text("paris"),
    ]);
    let mut sink = CollectingSink::default();

    let result = controller(&generator)
        .vote(
            &ReasoningRequest::new("Capital?").with_temperature(0.7),
            3,
            &cancel_signal(),
            &mut sink,
        )
        .expect("vote succeeds");

    assert_eq!(result.final_answer, "Paris");
    let vote = result.vote.expect("vote recorded");
    assert_eq!((vote.count, vote.total), (2, 3));
    assert_eq!(
        result.samples,
        Some(vec![
            "Paris".to_string(),
            " Paris\n".to_string(),
            "paris".to_string()
        ])
    );
    assert_eq!(
        sink.phases,
        vec![
            RunPhase::Sample { index: 1, total: 3 },
            RunPhase::Sample { index: 2, total: 3 },
            RunPhase::Sample { index: 3, total: 3 },
        ]
    );
    assert!(generator
        .requests()
        .iter()
        .all(|request| request.temperature == 0.7));
}

#[test]
fn vote_tie_goes_to_first_seen() {
    let generator = scripted(vec![
        ScriptedResponse::text("A"),
        ScriptedResponse::text("B"),
        ScriptedResponse::text("C"),
    ]);

    let result = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 3, &cancel_signal(), &mut NullSink)
        .expect("vote succeeds");

    assert_eq!(result.final_answer, "A");
}

#[test]
fn vote_with_one_sample_degenerates_to_single_shot() {
    let generator = scripted(vec![ScriptedResponse::text("only")]);

    let result = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 1, &cancel_signal(), &mut NullSink)
        .expect("vote succeeds");

    assert_eq!(result.final_answer, "only");
    assert_eq!(result.samples, Some(vec!["only".to_string()]));
}

#[test]
fn failed_samples_are_excluded_not_counted_as_empty_votes() {
    let generator = scripted(vec![
        ScriptedResponse::failure("connection refused"),
        ScriptedResponse::text("X"),
        ScriptedResponse::chunks(["Y partial"]).ending(ScriptedEnd::TimedOut),
    ]);

    let result = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 3, &cancel_signal(), &mut NullSink)
        .expect("one usable sample is enough");

    assert_eq!(result.final_answer, "X");
    assert_eq!(result.samples, Some(vec!["X".to_string()]));
    assert_eq!(result.excluded, 2);
    assert_eq!(result.iterations, 3);
}

#[test]
fn vote_without_usable_samples_is_an_error() {
    let generator = scripted(vec![
        ScriptedResponse::failure("down"),
        ScriptedResponse::chunks(["x"]).ending(ScriptedEnd::TimedOut),
    ]);

    let error = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 2, &cancel_signal(), &mut NullSink)
        .expect_err("nothing to vote on");

    assert!(matches!(
        error,
        ReasoningError::NoUsableSamples { attempted: 2 }
    ));
}

#[test]
fn vote_stops_on_fatal_request_errors() {
    let generator = scripted(vec![ScriptedResponse::text("A"), ScriptedResponse::text("B")]);

    let error = controller(&generator)
        .vote(
            &ReasoningRequest::new("q").with_temperature(3.0),
            2,
            &cancel_signal(),
            &mut NullSink,
        )
        .expect_err("temperature is out of range");

    assert!(matches!(
        error,
        ReasoningError::Generation(GenerationError::InvalidRequest(_))
    ));
    assert_eq!(generator.call_count(), 1);
}

#[test]
fn vote_requires_at_least_one_sample() {
    let generator = scripted(Vec::new());
    let error = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 0, &cancel_signal(), &mut NullSink)
        .expect_err("zero samples");

    assert!(matches!(error, ReasoningError::InvalidSettings(_)));
    assert_eq!(generator.call_count(), 0);
}

#[test]
fn cancelled_vote_keeps_completed_samples() {
    let generator = scripted(vec![
        ScriptedResponse::text("A"),
        ScriptedResponse::chunks(["B"]).ending(ScriptedEnd::Cancelled),
        ScriptedResponse::text("C"),
    ]);

    let result = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 3, &cancel_signal(), &mut NullSink)
        .expect("cancel is not an error");

    assert_eq!(result.status, GenerationStatus::Cancelled);
    assert_eq!(result.final_answer, "A");
    assert_eq!(result.samples, Some(vec!["A".to_string()]));
    assert_eq!(generator.remaining(), 1);
}

#[test]
fn cancelled_first_sample_returns_its_partial_text() {
    let generator = scripted(vec![
        ScriptedResponse::chunks(["half an ans"]).ending(ScriptedEnd::Cancelled)
    ]);

    let result = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 3, &cancel_signal(), &mut NullSink)
        .expect("cancel is not an error");

    assert_eq!(result.status, GenerationStatus::Cancelled);
    assert_eq!(result.final_answer, "half an ans");
    assert_eq!(result.samples, Some(Vec::new()));
}

#[test]
fn raised_cancel_skips_remaining_samples() {
    let generator = scripted(vec![ScriptedResponse::text("A"), ScriptedResponse::text("B")]);
    let cancel = cancel_signal();
    cancel.store(true, Ordering::Release);

    let result = controller(&generator)
        .vote(&ReasoningRequest::new("q"), 2, &cancel, &mut NullSink)
        .expect("cancel is not an error");

    assert_eq!(result.status, GenerationStatus::Cancelled);
    assert_eq!(result.final_answer, "");
    assert_eq!(result.iterations, 0);
    assert_eq!(generator.call_count(), 0);
}

#[test]
fn verification_confirming_stops_after_one_round() {
    let generator = scripted(vec![
        ScriptedResponse::text("4"),
        ScriptedResponse::text("Looks right: verified."),
        ScriptedResponse::text("never requested"),
    ]);

    let result = controller(&generator)
        .verify(
            &ReasoningRequest::new("2+2?").with_temperature(0.5),
            2,
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("verify succeeds");

    assert_eq!(result.final_answer, "4");
    assert_eq!(result.iterations, 1);
    assert_eq!(generator.remaining(), 1);

    let round = &generator.requests()[1];
    let tail: Vec<Message> = round.messages[round.messages.len() - 2..].to_vec();
    assert_eq!(
        tail,
        vec![Message::assistant("4"), Message::user(VERIFY_PROMPT)]
    );
    assert!((round.temperature - 0.5 * 0.8).abs() < 1e-6);
}

#[test]
fn unconfirmed_verification_keeps_the_last_response() {
    let generator = scripted(vec![
        ScriptedResponse::text("initial"),
        ScriptedResponse::text("second"),
        ScriptedResponse::text("third"),
    ]);

    let result = controller(&generator)
        .run(
            Strategy::Verify { max_iterations: 2 },
            &ReasoningRequest::new("q").with_temperature(0.5),
            &cancel_signal(),
            &mut NullSink,
        )
        .expect("verify succeeds");

    assert_eq!(result.final_answer, "third");
    assert_eq!(result.iterations, 2);

    let requests = generator.requests();
    assert_eq!(requests[2].messages[requests[2].messages.len() - 2].content, "second");
    assert!((requests[2].temperature - 0.5 * 0.8).abs() < 1e-6);
}

#[test]
fn verify_never_displays_thinking() {
    let generator = scripted(vec![
        ScriptedResponse::chunks(["<think>hmm</think>4"]),
        ScriptedResponse::chunks(["<think>check</think>VERIFIED"]),
    ]);
    let mut sink = CollectingSink::default();

    let result = controller(&generator)
        .verify(
            &ReasoningRequest::new("q").with_show_thinking(true),
            1,
            &cancel_signal(),
            &mut sink,
        )
        .expect("verify succeeds");

    assert_eq!(result.final_answer, "4");
    assert_eq!(
        sink.segments,
        vec![
            DecodedSegment::answer("4"),
            DecodedSegment::answer("VERIFIED")
        ]
    );
    assert_eq!(
        sink.phases,
        vec![RunPhase::Initial, RunPhase::Verify { round: 1, max: 1 }]
    );
    assert!(generator
        .requests()
        .iter()
        .all(|request| !request.show_thinking));
}

#[test]
fn incomplete_initial_answer_skips_verification() {
    let generator = scripted(vec![
        ScriptedResponse::chunks(["part"]).ending(ScriptedEnd::TimedOut)
    ]);

    let result = controller(&generator)
        .verify(&ReasoningRequest::new("q"), 2, &cancel_signal(), &mut NullSink)
        .expect("timeouts are not errors");

    assert_eq!(result.status, GenerationStatus::TimedOut);
    assert_eq!(result.final_answer, "part");
    assert_eq!(result.iterations, 0);
    assert_eq!(generator.call_count(), 1);
}

#[test]
fn failed_verification_round_keeps_current_answer() {
    let generator = scripted(vec![
        ScriptedResponse::text("init"),
        ScriptedResponse::failure("server went away"),
    ]);

    let result = controller(&generator)
        .verify(&ReasoningRequest::new("q"), 3, &cancel_signal(), &mut NullSink)
        .expect("round failures are not fatal");

    assert_eq!(result.final_answer, "init");
    assert_eq!(result.status, GenerationStatus::Completed);
    assert_eq!(generator.call_count(), 2);
}

#[test]
fn timed_out_verification_round_reports_status() {
    let generator = scripted(vec![
        ScriptedResponse::text("init"),
        ScriptedResponse::chunks(["half a correc"]).ending(ScriptedEnd::TimedOut),
    ]);

    let result = controller(&generator)
        .verify(&ReasoningRequest::new("q"), 2, &cancel_signal(), &mut NullSink)
        .expect("timeouts are not errors");

    assert_eq!(result.final_answer, "init");
    assert_eq!(result.status, GenerationStatus::TimedOut);
}

#[test]
fn empty_verification_reply_does_not_replace_answer() {
    let generator = scripted(vec![
        ScriptedResponse::text("init"),
        ScriptedResponse::text("   "),
    ]);

    let result = controller(&generator)
        .verify(&ReasoningRequest::new("q"), 1, &cancel_signal(), &mut NullSink)
        .expect("verify succeeds");

    assert_eq!(result.final_answer, "init");
}
