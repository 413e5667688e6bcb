// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
#![allow(missing_docs)]
//! Interactive boundaries in a full page: descriptors, sealed payloads,
//! marker keys and client runtime scripts.

use std::time::Duration;

use serde_json::json;
use weft_dry_tests::{
    child, collect_response, descriptors_in, el, test_options, text, BatchBuilder,
    CollectedResponse, ComponentBuilder, FnRenderer, StaticRenderer, TEST_ASSEMBLY,
};
use weft_proto::{
    DescriptorKind, MarkerScanner, ProtectError, ServerDescriptorVerifier, VerifyError,
    STREAM_TERMINATOR,
};
use weft_stream::{
    response_channel, Completion, ComponentId, InteractiveKind, Orchestrator, Parameter, Region,
    RenderBatch, RenderMode, RenderOutcome, RenderRequest, RenderSink, RootComponent,
    TreeRenderer, TypeIdentity,
};

const SERVER_SCRIPT: &str = "<script src=\"/_framework/weft.server.js\" autostart=\"false\"></script>";
const WASM_SCRIPT: &str =
    "<script src=\"/_framework/weft.webassembly.js\" autostart=\"false\"></script>";

fn dashboard() -> RenderBatch {
    BatchBuilder::new()
        .mount(ComponentBuilder::new(1, "Dashboard"))
        .mount(
            ComponentBuilder::new(2, "Counter")
                .parent(1)
                .mode(RenderMode::INTERACTIVE_SERVER)
                .param(Parameter::new(
                    "Start",
                    TypeIdentity::new("core", "i32"),
                    json!(41),
                )),
        )
        .mount(
            ComponentBuilder::new(3, "Chart")
                .parent(1)
                .site(1)
                .mode(RenderMode::INTERACTIVE_WEBASSEMBLY)
                .param(Parameter::new(
                    "Series",
                    TypeIdentity::new("core", "Vec<i32>"),
                    json!([1, 2, 3]),
                )),
        )
        .mount(
            ComponentBuilder::new(4, "Clock")
                .parent(1)
                .site(2)
                .mode(RenderMode::INTERACTIVE_AUTO),
        )
        .mount(
            ComponentBuilder::new(5, "Counter")
                .parent(1)
                .site(3)
                .key("second")
                .mode(RenderMode::Server { prerender: false }),
        )
        .update(
            1,
            vec![el("main")
                .child(child(2))
                .child(child(3))
                .child(child(4))
                .child(child(5))
                .build()],
        )
        .update(2, vec![el("button").text("41").build()])
        .update(3, vec![el("svg").build()])
        .update(4, vec![text("12:00")])
        .update(5, vec![text("never prerendered")])
        .build()
}

async fn render_page<R: TreeRenderer>(
    orchestrator: &Orchestrator,
    renderer: R,
    root: &str,
) -> (RenderOutcome, CollectedResponse) {
    let (writer, stream) = response_channel(16);
    let collector = tokio::spawn(collect_response(stream));
    let request = RenderRequest::new(
        RootComponent::new(TypeIdentity::new(TEST_ASSEMBLY, root)),
        "https://app.test/",
    );
    let outcome = orchestrator.render(renderer, request, writer).await.unwrap();
    (outcome, collector.await.unwrap())
}

async fn render_dashboard(orchestrator: &Orchestrator) -> (RenderOutcome, CollectedResponse) {
    render_page(orchestrator, StaticRenderer::new(1, dashboard()), "Dashboard").await
}

/// Streaming forecast hosting a server counter; the forecast refreshes
/// 50ms after the first flush while the counter stays mounted.
fn forecast_around_counter() -> impl TreeRenderer {
    FnRenderer::new(
        1,
        |_id: ComponentId, _parameters: Vec<Parameter>, sink: RenderSink| async move {
            sink.update_display(
                BatchBuilder::new()
                    .mount(ComponentBuilder::new(1, "Page"))
                    .mount(ComponentBuilder::new(2, "Forecast").parent(1).streaming())
                    .mount(
                        ComponentBuilder::new(3, "Counter")
                            .parent(2)
                            .mode(RenderMode::INTERACTIVE_SERVER)
                            .param(Parameter::new(
                                "Start",
                                TypeIdentity::new("core", "i32"),
                                json!(7),
                            )),
                    )
                    .update(1, vec![el("main").child(child(2)).build()])
                    .update(2, vec![text("Loading..."), child(3)])
                    .update(3, vec![el("button").text("7").build()])
                    .build(),
            );
            let subtree = sink.clone();
            let _handle = sink.spawn_subtree(Region::Streaming, async move {
                tokio::time::sleep(Duration::from_millis(50)).await;
                subtree.update_display(
                    BatchBuilder::new()
                        .update(2, vec![text("Sunny"), child(3)])
                        .build(),
                );
                Ok(())
            });
            Ok(())
        },
    )
}

#[tokio::test]
async fn page_carries_one_descriptor_per_boundary() {
    let (options, _, _) = test_options();
    let (outcome, response) = render_dashboard(&Orchestrator::new(options)).await;

    assert_eq!(outcome.completion, Completion::Completed);
    let descriptors = response.descriptors();
    let kinds: Vec<_> = descriptors.iter().map(|d| d.kind).collect();
    assert_eq!(
        kinds,
        vec![
            Some(DescriptorKind::Server),
            Some(DescriptorKind::WebAssembly),
            Some(DescriptorKind::Auto),
            Some(DescriptorKind::Server),
        ]
    );
    let sequences: Vec<_> = descriptors.iter().map(|d| d.sequence).collect();
    assert_eq!(sequences, vec![Some(0), Some(1), Some(2), Some(3)]);

    // Three prerendered boundaries close with an epilogue.
    let body = response.body();
    assert_eq!(body.matches("<!--Blazor:").count(), 7);
    assert!(!body.contains("never prerendered"));
    assert!(body.contains("<button>41</button>"));

    let keys = MarkerScanner::new().boundary_keys(&body).unwrap();
    let described: Vec<_> = descriptors.iter().filter_map(|d| d.key.clone()).collect();
    assert_eq!(keys, described);
    assert!(keys[3].has_component_key());
}

#[tokio::test]
async fn server_parameters_never_appear_in_clear() {
    let (options, _, _) = test_options();
    let (_, response) = render_dashboard(&Orchestrator::new(options)).await;

    let descriptors = response.descriptors();
    let counter = &descriptors[0];
    assert!(counter.type_name.is_none());
    assert!(counter.parameter_values.is_none());
    assert!(counter.protected_payload.is_some());

    let chart = &descriptors[1];
    assert_eq!(chart.type_name.as_deref(), Some("Chart"));
    assert_eq!(chart.parameter_values, Some(vec![json!([1, 2, 3])]));
    assert!(chart.protected_payload.is_none());
}

#[tokio::test]
async fn echoed_server_descriptors_verify_as_a_set() {
    let (options, protector, clock) = test_options();
    let (_, response) = render_dashboard(&Orchestrator::new(options)).await;

    let server: Vec<_> = response
        .descriptors()
        .into_iter()
        .filter(|d| matches!(d.kind, Some(DescriptorKind::Server | DescriptorKind::Auto)))
        .collect();
    let verifier = ServerDescriptorVerifier::new(protector);

    let payloads = verifier.verify(&server).unwrap();
    let sealed: Vec<_> = payloads.iter().map(|p| p.sequence).collect();
    assert_eq!(sealed, vec![0, 1, 2]);
    assert_eq!(payloads[0].type_name, "Counter");
    assert_eq!(payloads[0].parameter_values, vec![json!(41)]);
    assert!(payloads
        .iter()
        .all(|p| p.invocation_id == payloads[0].invocation_id));

    let partial = [server[0].clone(), server[2].clone()];
    assert_eq!(
        verifier.verify(&partial).unwrap_err(),
        VerifyError::OutOfSequence {
            expected: 1,
            found: 2
        }
    );

    clock.advance(Duration::from_secs(3600));
    assert!(matches!(
        verifier.verify(&server),
        Err(VerifyError::NotAuthentic {
            source: ProtectError::Expired,
            ..
        })
    ));
}

#[tokio::test]
async fn bootstrap_scripts_precede_the_terminator() {
    let (options, _, _) = test_options();
    let (outcome, response) = render_dashboard(&Orchestrator::new(options)).await;

    assert!(outcome.invoked.contains(InteractiveKind::Server));
    assert!(outcome.invoked.contains(InteractiveKind::WebAssembly));
    assert!(response
        .body()
        .ends_with(&format!("{SERVER_SCRIPT}{WASM_SCRIPT}{STREAM_TERMINATOR}")));
}

#[tokio::test]
async fn static_pages_load_no_runtime() {
    let (options, _, _) = test_options();
    let batch = BatchBuilder::new()
        .mount(ComponentBuilder::new(1, "About"))
        .update(1, vec![el("p").text("static").build()])
        .build();
    let (writer, stream) = response_channel(4);
    let collector = tokio::spawn(collect_response(stream));
    let outcome = Orchestrator::new(options)
        .render(
            StaticRenderer::new(1, batch),
            RenderRequest::new(
                RootComponent::new(TypeIdentity::new(TEST_ASSEMBLY, "About")),
                "https://app.test/about",
            ),
            writer,
        )
        .await
        .unwrap();

    assert!(outcome.invoked.is_empty());
    assert_eq!(
        collector.await.unwrap().body(),
        format!("<p>static</p>{STREAM_TERMINATOR}")
    );
}

#[tokio::test]
async fn developer_keys_cannot_break_out_of_markers() {
    let (options, _, _) = test_options();
    let hostile = "x--><script>alert(1)</script>";
    let batch = BatchBuilder::new()
        .mount(ComponentBuilder::new(1, "Grid"))
        .mount(
            ComponentBuilder::new(2, "Row")
                .parent(1)
                .mode(RenderMode::INTERACTIVE_WEBASSEMBLY)
                .key(hostile),
        )
        .update(1, vec![el("table").child(child(2)).build()])
        .update(2, vec![text("row")])
        .build();
    let (_, response) =
        render_page(&Orchestrator::new(options), StaticRenderer::new(1, batch), "Grid").await;

    let body = response.body();
    assert!(!body.contains("<script>alert(1)</script>"));
    let keys = MarkerScanner::new().boundary_keys(&body).unwrap();
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].formatted_component_key(), hostile);
    let described: Vec<_> = response
        .descriptors()
        .into_iter()
        .filter_map(|d| d.key)
        .collect();
    assert_eq!(keys, described);
}

#[tokio::test(start_paused = true)]
async fn refreshed_streaming_region_repeats_its_boundary_descriptors() {
    let (options, protector, _) = test_options();
    let (outcome, response) =
        render_page(&Orchestrator::new(options), forecast_around_counter(), "Page").await;
    assert_eq!(outcome.fragments, 1);

    let body = response.body();
    let fragment_open = "<template blazor-component-id=\"2\">";
    let at = body.find(fragment_open).unwrap();
    let (initial, rest) = body.split_at(at);
    let inner = &rest[fragment_open.len()..rest.find("</template>").unwrap()];
    assert!(inner.contains("Sunny"));
    assert_eq!(descriptors_in(inner), descriptors_in(initial));

    // Page as the client holds it once the fragment replaced the placeholder.
    let open = initial.find("<!--bl:2-->").unwrap() + "<!--bl:2-->".len();
    let close = initial.find("<!--/bl:2-->").unwrap();
    let patched = format!("{}{inner}{}", &initial[..open], &initial[close..]);

    let server = descriptors_in(&patched);
    assert_eq!(server.len(), 1);
    assert_eq!(server[0].sequence, Some(0));
    let payloads = ServerDescriptorVerifier::new(protector).verify(&server).unwrap();
    assert_eq!(payloads[0].type_name, "Counter");
    assert_eq!(payloads[0].parameter_values, vec![json!(7)]);
}
