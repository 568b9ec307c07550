pub mod model_store;
pub mod onnx_face_oracle;
pub mod onnx_session;
