/// Implements [`ConnectionMethods`][crate::db::ConnectionMethods] for a
/// type by forwarding every method to the value returned from the type's
/// `wrapped_connection_methods(&mut self) -> Result<&mut dyn ConnectionMethods>`.
///
/// Generic parameters, if any, go in leading brackets:
/// `connection_method_wrapper!([C: BackendConnection] Wrapper<C>)`.
#[macro_export]
macro_rules! connection_method_wrapper {
    ([$($generics:tt)*] $ty:ty) => {
        impl<$($generics)*> $crate::db::ConnectionMethods for $ty {
            fn query(&mut self, sql: &str) -> $crate::Result<$crate::db::Rows> {
                $crate::db::ConnectionMethods::query(self.wrapped_connection_methods()?, sql)
            }
            fn execute_query(
                &mut self,
                sql: &str,
                params: &[$crate::SqlVal],
            ) -> $crate::Result<$crate::db::Rows> {
                $crate::db::ConnectionMethods::execute_query(
                    self.wrapped_connection_methods()?,
                    sql,
                    params,
                )
            }
            fn execute_update(
                &mut self,
                sql: &str,
                params: &[$crate::SqlVal],
            ) -> $crate::Result<usize> {
                $crate::db::ConnectionMethods::execute_update(
                    self.wrapped_connection_methods()?,
                    sql,
                    params,
                )
            }
        }
    };
    ($ty:ty) => {
        $crate::connection_method_wrapper!([] $ty);
    };
}
