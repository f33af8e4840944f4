use datacrew_core::{AgentId, RoutingRequest};
use regex::Regex;
use std::sync::LazyLock;

/// `ROUTE: HANDOFF <agent>`, `ROUTE: LOOP_BACK <agent> REASON: <text>` or `ROUTE: COMPLETE`.
static ROUTE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    match Regex::new(
        r"(?im)^[ \t>*]*ROUTE[ \t]*:[ \t]*(HANDOFF|HAND_OFF|LOOP_BACK|LOOPBACK|COMPLETE)\b[ \t]*([A-Za-z][A-Za-z_-]*)?(?:[ \t]+REASON[ \t]*:[ \t]*(.*?))?[ \t*]*$",
    ) {
        Ok(regex) => regex,
        Err(err) => panic!("Route regex is invalid: {err}"),
    }
});

/// Routing request stated in model output.
///
/// The last marker wins so a model can revise its mind within one reply.
/// Markers without a target agent, other than `COMPLETE`, are ignored.
pub fn parse_routing(text: &str) -> Option<RoutingRequest> {
    ROUTE_REGEX.captures_iter(text).filter_map(|caps| {
        let keyword = caps.get(1)?.as_str().to_ascii_uppercase();
        if keyword == "COMPLETE" {
            return Some(RoutingRequest::Complete);
        }
        let agent = AgentId::parse_loose(caps.get(2)?.as_str());
        if keyword.starts_with("HAND") {
            return Some(RoutingRequest::Handoff { agent });
        }
        let reason = caps
            .get(3)
            .map(|reason| reason.as_str().trim().to_owned())
            .filter(|reason| !reason.is_empty())
            .unwrap_or_else(|| "no reason given".to_owned());
        Some(RoutingRequest::LoopBack { agent, reason })
    })
    .last()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handoff() {
        assert_eq!(
            parse_routing("Work done.\nROUTE: HANDOFF data-engineer"),
            Some(RoutingRequest::Handoff {
                agent: AgentId::DATA_ENGINEER
            })
        );
    }

    #[test]
    fn test_loop_back_with_reason() {
        assert_eq!(
            parse_routing("ROUTE: LOOP_BACK business_analyst REASON: target metric undefined"),
            Some(RoutingRequest::LoopBack {
                agent: AgentId::BUSINESS_ANALYST,
                reason: "target metric undefined".to_owned(),
            })
        );
    }

    #[test]
    fn test_loop_back_without_reason() {
        assert_eq!(
            parse_routing("**ROUTE: loop_back modeler**"),
            Some(RoutingRequest::LoopBack {
                agent: AgentId::MODELER,
                reason: "no reason given".to_owned(),
            })
        );
    }

    #[test]
    fn test_last_marker_wins() {
        let text = "ROUTE: HANDOFF modeler\nOn reflection:\nROUTE: COMPLETE";
        assert_eq!(parse_routing(text), Some(RoutingRequest::Complete));
    }

    #[test]
    fn test_marker_must_start_a_line() {
        assert_eq!(parse_routing("I will not write ROUTE: COMPLETE yet."), None);
        assert_eq!(parse_routing("ROUTE: HANDOFF"), None);
    }
}
