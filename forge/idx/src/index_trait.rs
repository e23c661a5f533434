/// A copyable handle into an arena. Implemented with [`impl_index!`](crate::impl_index).
pub trait IndexRef: Copy + Eq {
    fn index(&self) -> usize;
    fn new(input: usize) -> Self;
}
