use std::{fmt, marker::PhantomData, ops::Deref, sync::Arc};

use super::UniqueIdentifier;

/// Client I/O data wrapper
///
/// `U` is the data unique identifier (UID).
pub struct Data<U: UniqueIdentifier>(Arc<<U as UniqueIdentifier>::DataType>, PhantomData<U>);
impl<T, U: UniqueIdentifier<DataType = T>> Deref for Data<U> {
    type Target = T;
    /// Returns a reference to the data
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<T, U: UniqueIdentifier<DataType = T>> Clone for Data<U> {
    /// Makes a clone of the inner `Arc` pointer
    fn clone(&self) -> Self {
        Self(Arc::clone(&self.0), PhantomData)
    }
}

impl<T, U: UniqueIdentifier<DataType = T>> Data<U> {
    /// Moves `data` into an `Arc` pointer and places into `Data<U>`
    pub fn new(data: T) -> Self {
        Data(Arc::new(data), PhantomData)
    }
    /// Consumes `Data<U>`, returning the inner [Arc] pointer
    #[inline]
    pub fn into_arc(self) -> Arc<T> {
        self.0
    }
}

impl<T, U: UniqueIdentifier<DataType = Vec<T>>> From<Vec<T>> for Data<U> {
    fn from(u: Vec<T>) -> Self {
        Data(Arc::new(u), PhantomData)
    }
}
impl<T, U> fmt::Debug for Data<U>
where
    T: fmt::Debug,
    U: UniqueIdentifier<DataType = T>,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Data").field(&self.0).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    pub enum Grid {}
    impl UniqueIdentifier for Grid {
        type DataType = Vec<f64>;
    }
    pub enum Actuators {}
    impl UniqueIdentifier for Actuators {
        type DataType = Vec<f64>;
    }

    #[test]
    fn clone_shares_the_pointer() {
        let data = Data::<Grid>::new(vec![1., 2., 3.]);
        let shared = data.clone();
        assert!(Arc::ptr_eq(&shared.into_arc(), &data.into_arc()));
    }

    #[test]
    fn from_vec() {
        let data: Data<Actuators> = vec![0.5; 4].into();
        assert_eq!(*data, vec![0.5; 4]);
        assert_eq!(format!("{data:?}"), "Data([0.5, 0.5, 0.5, 0.5])");
    }
}
