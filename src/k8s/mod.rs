pub mod k8s_secret_store;
