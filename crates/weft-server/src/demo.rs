// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Demo pages rendered by the host.
//!
//! | path             | behavior                                           |
//! |------------------|----------------------------------------------------|
//! | `/`              | streamed forecast plus server and WebAssembly islands |
//! | `/moved`         | navigates before the first flush (302)             |
//! | `/late-redirect` | navigates from a streaming subtree (redirection fragment) |
//! | `/boom`          | streaming subtree fails (error fragment)           |

use std::time::Duration;

use futures_util::future::BoxFuture;
use weft_proto::{Parameter, RenderMode, TypeIdentity};
use weft_stream::{
    ComponentError, ComponentId, ComponentInfo, Frame, Region, RenderBatch, RenderSink,
    RootComponent, TreeRenderer,
};

const ASSEMBLY: &str = "weft-server";
const LAYOUT: ComponentId = ComponentId(1);
const FORECAST: ComponentId = ComponentId(2);
const COUNTER: ComponentId = ComponentId(3);
const CHART: ComponentId = ComponentId(4);

/// One demo page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DemoRoute {
    Home,
    Moved,
    LateRedirect,
    Boom,
}

impl DemoRoute {
    pub(crate) fn from_path(path: &str) -> Option<Self> {
        match path {
            "/" => Some(Self::Home),
            "/moved" => Some(Self::Moved),
            "/late-redirect" => Some(Self::LateRedirect),
            "/boom" => Some(Self::Boom),
            _ => None,
        }
    }

    pub(crate) fn root(self) -> RootComponent {
        let name = match self {
            Self::Home => "HomePage",
            Self::Moved => "MovedPage",
            Self::LateRedirect => "LateRedirectPage",
            Self::Boom => "BoomPage",
        };
        RootComponent::new(TypeIdentity::new(ASSEMBLY, name))
    }
}

/// Renders one demo page for one response.
#[derive(Debug, Clone)]
pub(crate) struct DemoRenderer {
    route: DemoRoute,
    delay: Duration,
}

impl DemoRenderer {
    /// `delay` is how long the streamed forecast takes.
    pub(crate) fn new(route: DemoRoute, delay: Duration) -> Self {
        Self { route, delay }
    }
}

impl TreeRenderer for DemoRenderer {
    fn assign_root_component_id(&mut self, _root: &RootComponent) -> ComponentId {
        LAYOUT
    }

    fn render_root_component(
        &mut self,
        _id: ComponentId,
        _parameters: Vec<Parameter>,
        sink: RenderSink,
    ) -> BoxFuture<'static, Result<(), ComponentError>> {
        let route = self.route;
        let delay = self.delay;
        Box::pin(async move {
            if route == DemoRoute::Moved {
                sink.navigate("/");
                return Ok(());
            }
            sink.update_display(layout_batch(route));
            let subtree = sink.clone();
            drop(sink.spawn_subtree(Region::Streaming, async move {
                tokio::time::sleep(delay).await;
                match route {
                    DemoRoute::LateRedirect => subtree.navigate("/"),
                    DemoRoute::Boom => {
                        return Err(ComponentError::new(
                            "ForecastError",
                            "weather service unavailable",
                        ));
                    }
                    DemoRoute::Home | DemoRoute::Moved => subtree.update_display(RenderBatch {
                        updated: vec![(
                            FORECAST,
                            vec![el("ul", vec![
                                el("li", vec![Frame::Text("Mon: sunny, 24°C".into())]),
                                el("li", vec![Frame::Text("Tue: showers, 19°C".into())]),
                            ])],
                        )],
                        ..RenderBatch::default()
                    }),
                }
                Ok(())
            }));
            Ok(())
        })
    }
}

fn el(name: &str, children: Vec<Frame>) -> Frame {
    Frame::Element {
        name: name.to_owned(),
        attributes: Vec::new(),
        children,
    }
}

fn component(id: ComponentId, parent: ComponentId, name: &str, site: u32) -> ComponentInfo {
    let mut info = ComponentInfo::new(id, Some(parent), TypeIdentity::new(ASSEMBLY, name));
    info.site_sequence = site;
    info
}

fn layout_batch(route: DemoRoute) -> RenderBatch {
    let mut forecast = component(FORECAST, LAYOUT, "Forecast", 0);
    forecast.streaming = true;

    let mut counter = component(COUNTER, LAYOUT, "Counter", 1);
    counter.render_mode = Some(RenderMode::INTERACTIVE_SERVER);
    counter.parameters = vec![Parameter::new(
        "Start",
        TypeIdentity::new("core", "i32"),
        serde_json::json!(3),
    )];

    let mut chart = component(CHART, LAYOUT, "Chart", 2);
    chart.render_mode = Some(RenderMode::INTERACTIVE_WEBASSEMBLY);

    let root = ComponentInfo::new(LAYOUT, None, route.root().type_identity);
    let page = vec![
        Frame::Markup("<!DOCTYPE html>".into()),
        el("html", vec![
            el("head", vec![el("title", vec![Frame::Text("weft".into())])]),
            el("body", vec![el("main", vec![
                el("h1", vec![Frame::Text("Forecast".into())]),
                Frame::Component(FORECAST),
                Frame::Component(COUNTER),
                Frame::Component(CHART),
            ])]),
        ]),
    ];
    RenderBatch {
        mounted: vec![root, forecast, counter, chart],
        updated: vec![
            (LAYOUT, page),
            (FORECAST, vec![Frame::Text("Loading forecast...".into())]),
            (COUNTER, vec![el("button", vec![Frame::Text("3".into())])]),
            (CHART, vec![el("canvas", Vec::new())]),
        ],
        disposed: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routes_map_to_distinct_roots() {
        let paths = ["/", "/moved", "/late-redirect", "/boom"];
        let roots: Vec<_> = paths
            .iter()
            .map(|p| DemoRoute::from_path(p).unwrap().root().type_identity.name)
            .collect();
        assert_eq!(roots, ["HomePage", "MovedPage", "LateRedirectPage", "BoomPage"]);
        assert!(DemoRoute::from_path("/missing").is_none());
    }

    #[test]
    fn layout_mounts_parents_first() {
        let batch = layout_batch(DemoRoute::Home);
        assert_eq!(batch.mounted[0].id, LAYOUT);
        assert!(batch.mounted[1..].iter().all(|c| c.parent == Some(LAYOUT)));
        assert!(batch.mounted.iter().any(|c| c.streaming));
    }
}
