#[macro_export]
/// Implements [IndexRef](crate::IndexRef) for a tuple struct wrapping an
/// unsigned integer. The backing type defaults to [`u32`].
///
/// ```
/// use forge_idx::{impl_index, IndexRef};
/// #[derive(Clone, Copy, PartialEq, Eq, Debug)]
/// struct NodeIdx(u32);
/// impl_index!(NodeIdx);
/// assert_eq!(NodeIdx::new(3).index(), 3);
/// ```
macro_rules! impl_index {
    ($struct_name: ident) => {
        $crate::impl_index!($struct_name, u32);
    };

    ($struct_name: ident, $backing_ty: ty) => {
        impl $crate::IndexRef for $struct_name {
            fn index(&self) -> usize {
                self.0 as usize
            }

            fn new(input: usize) -> Self {
                Self(input as $backing_ty)
            }
        }

        impl From<usize> for $struct_name {
            fn from(input: usize) -> Self {
                $crate::IndexRef::new(input)
            }
        }

        impl std::fmt::Display for $struct_name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}#{}", stringify!($struct_name), self.0)
            }
        }
    };
}
