use forge_ir::{AccessKind, CompIdx, CompKind, Design, Latency};

/// Whether the control flop between a loop body's feedback exit and the
/// start of the next iteration is required.
///
/// The flop can go when every path through the feedback exit already takes
/// at least one clock, so the next iteration never starts combinationally
/// from the previous one, and the body performs no memory access whose
/// request must be released for a clock between iterations.
pub fn flop_needed(design: &Design, loop_body: CompIdx, feedback: Latency) -> bool {
    feedback.min_clocks() == 0
        || design.contains(loop_body, |c| {
            matches!(
                c.kind,
                CompKind::Access {
                    kind: AccessKind::MemoryRead | AccessKind::MemoryWrite,
                    ..
                }
            )
        })
}
