//! Messages the engine sends to the agents

use crate::protocol::Proposal;

/// Sent to the proposer when its response holds no well-formed proposal.
pub fn correction() -> String {
    let example = Proposal::new("filewrite", "script|myscript.py|print('hello')");
    format!(
        "Bad command received. Please reply with ONLY a single valid command in the following format, and nothing else:\n\
         {{{{#command#}}args[END_CMD]\n\
         For example: {}",
        example.render()
    )
}

pub fn review(prefix: &str, proposal: &Proposal) -> String {
    format!("{}\nCommand from right agent: {}", prefix, proposal.render())
}

/// Re-asks the reviewer about the same original proposal.
pub fn retry(prefix: &str, proposal: &Proposal) -> String {
    format!("{}\nRetry command: {}", prefix, proposal.render())
}

pub fn escalation(reviewer_response: &str) -> String {
    format!(
        "No agreement from left agent. Response: {}. Refactor command.",
        reviewer_response
    )
}

pub fn execution_result(proposal: &Proposal, outcome: &str) -> String {
    format!("Command executed: {}. Result: {}", proposal.render(), outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::parse;

    #[test]
    fn test_correction_example_parses() {
        let text = correction();
        assert!(text.contains("{{#command#}args[END_CMD]"));
        let example = parse(text.split("For example: ").nth(1).unwrap()).unwrap();
        assert_eq!(example.command, "filewrite");
    }

    #[test]
    fn test_review_and_retry_carry_the_original() {
        let p = Proposal::new("getfilecontent", "notes.txt");
        let review = review("You are the reviewer.", &p);
        assert!(review.starts_with("You are the reviewer.\n"));
        assert_eq!(parse(&review), Some(p.clone()));
        assert_eq!(parse(&retry("prefix", &p)), Some(p));
    }

    #[test]
    fn test_escalation_and_result() {
        assert_eq!(
            escalation("nope"),
            "No agreement from left agent. Response: nope. Refactor command."
        );
        let p = Proposal::new("listmemoryfiles", "");
        assert_eq!(
            execution_result(&p, "a.txt"),
            "Command executed: {{#listmemoryfiles#}[END_CMD]. Result: a.txt"
        );
    }
}
